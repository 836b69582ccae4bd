// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Submission fetching
//!
//! The submissions API returns every submission it knows for an account.
//! Only the ones the job names are migrated; the rest are ignored. A named
//! submission that cannot be decoded is still handed on, as
//! [`Submission::Malformed`], so it fails on its own without holding up the
//! rest of the job.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use reqwest::Client;
use survey_migration_types::{InstanceId, SubmissionRecord, SubmissionsRequest};
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::jobs::Job;

/// One selected entry of the submissions response
#[derive(Debug, Clone)]
pub enum Submission {
    Record(SubmissionRecord),
    Malformed { instance: InstanceId, reason: String },
}

impl Submission {
    pub fn instance(&self) -> &InstanceId {
        match self {
            Submission::Record(record) => &record.instance_id,
            Submission::Malformed { instance, .. } => instance,
        }
    }
}

impl From<SubmissionRecord> for Submission {
    fn from(record: SubmissionRecord) -> Self {
        Submission::Record(record)
    }
}

/// Client for the submissions API
#[derive(Clone, Debug)]
pub struct SubmissionFetcher {
    client: Client,
    url: String,
}

impl SubmissionFetcher {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, JobError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JobError::FetchFailed(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/submissions", api_url.trim_end_matches('/')),
        })
    }

    /// Fetch the submissions named by `job`
    ///
    /// The API takes its query as a JSON body on a GET.
    pub async fn fetch(&self, job: &Job) -> Result<Vec<Submission>, JobError> {
        let request = SubmissionsRequest {
            kobo_username: &job.source.username,
            kobo_password: &job.source.password,
            kobo_uid: &job.source.account_id,
            email: &job.identity,
        };

        let response = self
            .client
            .get(self.url.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| JobError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobError::FetchFailed(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        let raw: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| JobError::FetchFailed(format!("invalid response body: {}", e)))?;
        let available = raw.len();

        let records = select_submissions(raw, &job.instance_ids);
        let malformed = records
            .iter()
            .filter(|s| matches!(s, Submission::Malformed { .. }))
            .count();
        info!(
            identity = %job.identity,
            available,
            selected = records.len(),
            malformed,
            requested = job.instance_ids.len(),
            "Fetched submissions"
        );

        Ok(records)
    }
}

/// Keep the entries whose instance id is in `instance_ids`, in response
/// order, each id at most once.
///
/// Entries outside the set are skipped without being parsed. Selected
/// entries that do not decode come back as [`Submission::Malformed`].
pub fn select_submissions(
    raw: Vec<serde_json::Value>,
    instance_ids: &BTreeSet<InstanceId>,
) -> Vec<Submission> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for entry in raw {
        let Some(id) = entry
            .get("instance")
            .and_then(|v| serde_json::from_value::<InstanceId>(v.clone()).ok())
        else {
            debug!("Skipping submission without a usable instance id");
            continue;
        };

        if !instance_ids.contains(&id) {
            continue;
        }
        if !seen.insert(id.clone()) {
            debug!(instance = %id, "Skipping duplicate submission");
            continue;
        }

        match serde_json::from_value::<SubmissionRecord>(entry) {
            Ok(record) => records.push(Submission::Record(record)),
            Err(e) => {
                let reason = e.to_string();
                warn!(instance = %id, error = %reason, "Submission does not decode");
                records.push(Submission::Malformed {
                    instance: id,
                    reason,
                });
            }
        }
    }

    records
}

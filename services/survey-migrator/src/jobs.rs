// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Job loading
//!
//! A user's migration intent is stored as one or more descriptors in the job
//! bucket, each keyed by the user's email followed by an arbitrary suffix.
//! Loading merges all of them into a single [`Job`]: the instance sets are
//! unioned, and credentials come from the last descriptor in key order.

use std::collections::BTreeSet;

use blob_store::BlobStore;
use secrecy::{ExposeSecret, SecretString};
use survey_migration_types::{InstanceId, JobDescriptor};
use tracing::{debug, warn};

use crate::error::JobError;

/// Access to the survey backend account
#[derive(Debug)]
pub struct SourceCredentials {
    pub username: String,
    pub password: SecretString,
    /// Form (asset) identifier the submissions live under
    pub account_id: String,
}

/// Access to the observation platform account
#[derive(Debug)]
pub struct DestinationCredentials {
    pub identity: String,
    pub password: SecretString,
    pub client_id: String,
    pub client_secret: SecretString,
}

/// Everything pending for one identity, merged from its descriptors
#[derive(Debug)]
pub struct Job {
    pub identity: String,
    pub source: SourceCredentials,
    pub destination: DestinationCredentials,
    pub instance_ids: BTreeSet<InstanceId>,
    /// Keys of every descriptor merged into this job, in key order
    pub descriptor_keys: Vec<String>,
}

/// Reads and merges job descriptors from the job bucket
pub struct JobLoader<'a> {
    store: &'a dyn BlobStore,
    bucket: &'a str,
}

impl<'a> JobLoader<'a> {
    pub fn new(store: &'a dyn BlobStore, bucket: &'a str) -> Self {
        Self { store, bucket }
    }

    /// Load the job for `identity`, or `None` if nothing is stored for it.
    ///
    /// Any descriptor that cannot be read or parsed fails the whole load;
    /// merging around it could silently drop instances.
    pub async fn load(&self, identity: &str) -> Result<Option<Job>, JobError> {
        let keys = self.store.list(self.bucket, identity).await?;
        if keys.is_empty() {
            debug!(identity, bucket = self.bucket, "No job descriptors stored");
            return Ok(None);
        }

        let mut descriptors = Vec::with_capacity(keys.len());
        for key in keys {
            let body = self.store.get(self.bucket, &key).await?;
            let descriptor: JobDescriptor =
                serde_json::from_slice(&body).map_err(|e| JobError::MalformedDescriptor {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            descriptors.push((key, descriptor));
        }

        Ok(merge_descriptors(identity, descriptors))
    }
}

/// Merge descriptors (in key order) into one job
pub fn merge_descriptors(identity: &str, descriptors: Vec<(String, JobDescriptor)>) -> Option<Job> {
    let mut job: Option<Job> = None;

    for (key, descriptor) in descriptors {
        let JobDescriptor {
            source_username,
            source_password,
            source_account_id,
            destination_identity,
            destination_password,
            destination_client_id,
            destination_client_secret,
            instance_ids,
        } = descriptor;

        let source = SourceCredentials {
            username: source_username,
            password: source_password,
            account_id: source_account_id,
        };
        let destination = DestinationCredentials {
            identity: destination_identity,
            password: destination_password,
            client_id: destination_client_id,
            client_secret: destination_client_secret,
        };

        match job.as_mut() {
            None => {
                job = Some(Job {
                    identity: identity.to_string(),
                    source,
                    destination,
                    instance_ids: instance_ids.into_iter().collect(),
                    descriptor_keys: vec![key],
                });
            }
            Some(job) => {
                if !same_source(&job.source, &source)
                    || !same_destination(&job.destination, &destination)
                {
                    warn!(
                        identity,
                        key = %key,
                        "Job descriptors disagree on credentials; using the later descriptor"
                    );
                }
                job.source = source;
                job.destination = destination;
                job.instance_ids.extend(instance_ids);
                job.descriptor_keys.push(key);
            }
        }
    }

    job
}

fn same_source(a: &SourceCredentials, b: &SourceCredentials) -> bool {
    a.username == b.username
        && a.account_id == b.account_id
        && a.password.expose_secret() == b.password.expose_secret()
}

fn same_destination(a: &DestinationCredentials, b: &DestinationCredentials) -> bool {
    a.identity == b.identity
        && a.client_id == b.client_id
        && a.password.expose_secret() == b.password.expose_secret()
        && a.client_secret.expose_secret() == b.client_secret.expose_secret()
}

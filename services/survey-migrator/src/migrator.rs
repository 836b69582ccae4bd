// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Job orchestration
//!
//! Ties the pieces together for one identity: load the job, fetch its
//! submissions, connect to both platforms and run the pipeline.

use std::time::Instant;

use blob_store::BlobStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::MigratorConfig;
use crate::error::JobError;
use crate::jobs::JobLoader;
use crate::pipeline::{JobReport, MigrationPipeline, release_descriptors};
use crate::platform::PlatformConnector;
use crate::submissions::SubmissionFetcher;

/// Result of a run that did not hit a job-level error
#[derive(Debug)]
pub enum JobOutcome {
    /// Nothing is stored for the identity
    Absent,
    Completed(JobReport),
}

pub struct Migrator<'a, C> {
    config: &'a MigratorConfig,
    store: &'a dyn BlobStore,
    fetcher: &'a SubmissionFetcher,
    connector: &'a C,
}

impl<'a, C: PlatformConnector> Migrator<'a, C> {
    pub fn new(
        config: &'a MigratorConfig,
        store: &'a dyn BlobStore,
        fetcher: &'a SubmissionFetcher,
        connector: &'a C,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            connector,
        }
    }

    /// Migrate everything pending for `identity`
    pub async fn run(
        &self,
        identity: &str,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, JobError> {
        let loader = JobLoader::new(self.store, &self.config.job_bucket);
        let Some(job) = loader.load(identity).await? else {
            debug!(identity, "No job for identity");
            return Ok(JobOutcome::Absent);
        };
        info!(
            identity,
            instances = job.instance_ids.len(),
            descriptors = job.descriptor_keys.len(),
            "Loaded job"
        );

        let records = self.fetcher.fetch(&job).await?;

        if records.is_empty() {
            // Nothing left at the source, so the descriptors are spent
            let started = Instant::now();
            let descriptors = release_descriptors(self.config, self.store, &job, &[]).await;
            return Ok(JobOutcome::Completed(JobReport {
                identity: job.identity.clone(),
                records: Vec::new(),
                descriptors,
                elapsed_secs: started.elapsed().as_secs_f64(),
            }));
        }

        let source = self
            .connector
            .connect_source(&job.source)
            .await
            .map_err(|e| JobError::ClientSetup {
                platform: "KoboToolbox",
                reason: format!("{:#}", e),
            })?;
        let destination = self
            .connector
            .connect_destination(&job.destination)
            .await
            .map_err(|e| JobError::ClientSetup {
                platform: "iNaturalist",
                reason: format!("{:#}", e),
            })?;

        let pipeline = MigrationPipeline::new(self.config, self.store, &source, &destination);
        Ok(JobOutcome::Completed(
            pipeline.run(&job, records, cancel).await,
        ))
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Record migration pipeline
//!
//! Every record goes through the same steps, strictly in order:
//!
//! 1. materialize: fetch the submission payload once, then download its
//!    images into a private scratch directory
//! 2. backup: write the submission payload, then each image, to the backup
//!    bucket
//! 3. upload: create the observation, attach images, attach fields
//! 4. source cleanup: delete the submission from the survey backend
//!
//! A record's source is deleted only after its backup and upload both
//! succeeded. A failed record stops at the failing step and leaves its source
//! untouched; other records carry on. A submission that could not be decoded
//! fails the same way without any step being attempted.
//!
//! Once every record is accounted for, the job's descriptors are deleted,
//! but only when no record failed or was abandoned. Otherwise they stay so
//! a later run can pick up the remaining records.

use std::future::Future;
use std::time::{Duration, Instant};

use blob_store::BlobStore;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use inaturalist_client::{NewObservation, ObservationId};
use serde::Serialize;
use survey_migration_types::{InstanceId, SubmissionRecord, Taxon};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifacts::{ImageArtifact, RecordWorkspace, image_suffixes};
use crate::backup;
use crate::config::MigratorConfig;
use crate::error::{DeleteFailed, RecordError, RecordStep};
use crate::jobs::Job;
use crate::metrics;
use crate::platform::{DestinationPlatform, SourcePlatform};
use crate::submissions::Submission;

// ============================================================================
// Reports
// ============================================================================

/// How far a record got
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    /// Backed up, uploaded and removed from the source
    Migrated { observation_id: ObservationId },

    /// Backed up and uploaded, but the source delete failed. Re-running
    /// would duplicate the observation, so this is not retried.
    MigratedSourceRetained {
        observation_id: ObservationId,
        error: String,
    },

    /// Stopped at `step`; the source is untouched
    Failed {
        step: RecordStep,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        observation_id: Option<ObservationId>,
    },

    /// Cancelled before `before` started; the source is untouched
    Abandoned { before: RecordStep },
}

impl RecordStatus {
    /// Whether the record still has to be migrated by a later run
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self,
            RecordStatus::Failed { .. } | RecordStatus::Abandoned { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordStatus::Migrated { .. } => "migrated",
            RecordStatus::MigratedSourceRetained { .. } => "migrated_source_retained",
            RecordStatus::Failed { .. } => "failed",
            RecordStatus::Abandoned { .. } => "abandoned",
        }
    }

    pub fn observation_id(&self) -> Option<ObservationId> {
        match self {
            RecordStatus::Migrated { observation_id }
            | RecordStatus::MigratedSourceRetained { observation_id, .. } => Some(*observation_id),
            RecordStatus::Failed { observation_id, .. } => *observation_id,
            RecordStatus::Abandoned { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordReport {
    pub instance: InstanceId,
    pub images: usize,
    #[serde(flatten)]
    pub status: RecordStatus,
}

/// What happened to the job's descriptors
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DescriptorCleanup {
    Deleted { keys: Vec<String> },
    Retained { reason: String },
    Partial {
        deleted: Vec<String>,
        failed: Vec<DeleteFailed>,
    },
}

/// Outcome of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub identity: String,
    pub records: Vec<RecordReport>,
    pub descriptors: DescriptorCleanup,
    pub elapsed_secs: f64,
}

impl JobReport {
    fn count(&self, label: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.status.label() == label)
            .count()
    }

    pub fn migrated(&self) -> usize {
        self.count("migrated") + self.count("migrated_source_retained")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn abandoned(&self) -> usize {
        self.count("abandoned")
    }

    pub fn is_complete(&self) -> bool {
        !self.records.iter().any(|r| r.status.is_outstanding())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Migrates the records of one job
pub struct MigrationPipeline<'a, S, D> {
    config: &'a MigratorConfig,
    store: &'a dyn BlobStore,
    source: &'a S,
    destination: &'a D,
}

impl<'a, S: SourcePlatform, D: DestinationPlatform> MigrationPipeline<'a, S, D> {
    pub fn new(
        config: &'a MigratorConfig,
        store: &'a dyn BlobStore,
        source: &'a S,
        destination: &'a D,
    ) -> Self {
        Self {
            config,
            store,
            source,
            destination,
        }
    }

    /// Migrate `records`, then release the job's descriptors if nothing is
    /// left outstanding.
    ///
    /// Up to `record_concurrency` records are in flight at once; results are
    /// reported in input order. Once `cancel` fires, no record starts a new
    /// step, except that a record already past its upload still deletes its
    /// source.
    pub async fn run(
        &self,
        job: &Job,
        records: Vec<Submission>,
        cancel: &CancellationToken,
    ) -> JobReport {
        let started = Instant::now();
        info!(
            identity = %job.identity,
            records = records.len(),
            concurrency = self.config.record_concurrency,
            "Starting migration"
        );

        let reports: Vec<RecordReport> = stream::iter(records.iter())
            .map(move |record| self.process_record(job, record, cancel))
            .buffered(self.config.record_concurrency.max(1))
            .collect()
            .await;

        let descriptors = release_descriptors(self.config, self.store, job, &reports).await;
        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_job_duration(elapsed);

        let report = JobReport {
            identity: job.identity.clone(),
            records: reports,
            descriptors,
            elapsed_secs: elapsed,
        };
        info!(
            identity = %report.identity,
            migrated = report.migrated(),
            failed = report.failed(),
            abandoned = report.abandoned(),
            elapsed_secs = elapsed,
            "Migration finished"
        );
        report
    }

    async fn process_record(
        &self,
        job: &Job,
        submission: &Submission,
        cancel: &CancellationToken,
    ) -> RecordReport {
        let (images, status) = match submission {
            Submission::Record(record) => (
                record.images.len(),
                self.migrate_record(job, record, cancel).await,
            ),
            Submission::Malformed { reason, .. } => {
                (0, failed(RecordError::Malformed(reason.clone())))
            }
        };
        let instance = submission.instance();

        match &status {
            RecordStatus::Migrated { observation_id } => {
                info!(instance = %instance, observation_id, "Record migrated");
                metrics::record_status(status.label());
            }
            RecordStatus::MigratedSourceRetained {
                observation_id,
                error,
            } => {
                warn!(
                    instance = %instance,
                    observation_id,
                    error = %error,
                    "Record migrated but source delete failed"
                );
                metrics::record_status(status.label());
                metrics::record_cleanup_failure();
            }
            RecordStatus::Failed {
                step,
                error,
                observation_id,
            } => {
                error!(
                    instance = %instance,
                    step = %step,
                    observation_id = ?observation_id,
                    error = %error,
                    "Record migration failed"
                );
                metrics::record_failure(&step.to_string());
            }
            RecordStatus::Abandoned { before } => {
                info!(instance = %instance, before = %before, "Record abandoned on cancellation");
                metrics::record_status(status.label());
            }
        }

        RecordReport {
            instance: instance.clone(),
            images,
            status,
        }
    }

    async fn migrate_record(
        &self,
        job: &Job,
        record: &SubmissionRecord,
        cancel: &CancellationToken,
    ) -> RecordStatus {
        if cancel.is_cancelled() {
            return RecordStatus::Abandoned {
                before: RecordStep::Materialize,
            };
        }

        let account_id = job.source.account_id.as_str();
        let workspace =
            match RecordWorkspace::create(&self.config.work_dir, account_id, &record.instance_id) {
                Ok(workspace) => workspace,
                Err(e) => return failed(RecordError::Scratch(e.to_string())),
            };

        let status = self
            .migrate_in(&workspace, account_id, record, cancel)
            .await;

        let dir = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(
                instance = %record.instance_id,
                path = %dir.display(),
                error = %e,
                "Failed to remove scratch directory"
            );
            metrics::record_cleanup_failure();
        }

        status
    }

    async fn migrate_in(
        &self,
        workspace: &RecordWorkspace,
        account_id: &str,
        record: &SubmissionRecord,
        cancel: &CancellationToken,
    ) -> RecordStatus {
        let instance = &record.instance_id;

        let payload = match timed(
            self.config.call_timeout,
            self.source.pull_instance(account_id, instance),
        )
        .await
        {
            Ok(payload) => payload,
            Err(e) => return failed(RecordError::InstancePull(format!("{:#}", e))),
        };
        let artifacts = match self.materialize(workspace, record, &payload).await {
            Ok(artifacts) => artifacts,
            Err(e) => return failed(e),
        };

        if cancel.is_cancelled() {
            return RecordStatus::Abandoned {
                before: RecordStep::Backup,
            };
        }
        if let Err(e) = self.backup(account_id, record, &payload, &artifacts).await {
            return failed(e);
        }

        if cancel.is_cancelled() {
            return RecordStatus::Abandoned {
                before: RecordStep::Upload,
            };
        }
        let observation_id = match self.upload(record, &artifacts).await {
            Ok(id) => id,
            Err(e) => return failed(e),
        };

        match timed(
            self.config.call_timeout,
            self.source.delete_instance(account_id, instance),
        )
        .await
        {
            Ok(()) => RecordStatus::Migrated { observation_id },
            Err(e) => RecordStatus::MigratedSourceRetained {
                observation_id,
                error: DeleteFailed {
                    target: format!("source instance {}", instance),
                    reason: format!("{:#}", e),
                }
                .to_string(),
            },
        }
    }

    async fn materialize(
        &self,
        workspace: &RecordWorkspace,
        record: &SubmissionRecord,
        payload: &serde_json::Value,
    ) -> Result<Vec<ImageArtifact>, RecordError> {
        let suffixes = image_suffixes(&record.images);
        let mut artifacts = Vec::with_capacity(record.images.len());

        for (image, suffix) in record.images.iter().zip(suffixes) {
            let path = workspace.artifact_path(image);
            let bytes = timed(
                self.config.call_timeout,
                self.source
                    .pull_image(payload, &record.instance_id, image, &path),
            )
            .await
            .map_err(|e| RecordError::ImagePull {
                image: image.clone(),
                reason: format!("{:#}", e),
            })?;

            debug!(instance = %record.instance_id, image = %image, bytes, "Image materialized");
            artifacts.push(ImageArtifact {
                image_ref: image.clone(),
                path,
                suffix,
            });
        }

        Ok(artifacts)
    }

    async fn backup(
        &self,
        account_id: &str,
        record: &SubmissionRecord,
        payload: &serde_json::Value,
        artifacts: &[ImageArtifact],
    ) -> Result<(), RecordError> {
        let instance = &record.instance_id;
        let record_key = backup::record_key(account_id, instance);

        let body = backup::canonical_json(payload).map_err(|e| RecordError::Backup {
            key: record_key.clone(),
            reason: e.to_string(),
        })?;
        self.put_backup(&record_key, Bytes::from(body)).await?;

        for artifact in artifacts {
            let key = backup::image_key(account_id, instance, &artifact.suffix);
            let data = tokio::fs::read(&artifact.path)
                .await
                .map_err(|e| RecordError::Backup {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            self.put_backup(&key, Bytes::from(data)).await?;
            metrics::record_image_backed_up();
        }

        debug!(instance = %instance, images = artifacts.len(), "Record backed up");
        Ok(())
    }

    async fn put_backup(&self, key: &str, body: Bytes) -> Result<(), RecordError> {
        timed(
            self.config.call_timeout,
            self.store.put(&self.config.backup_bucket, key, body),
        )
        .await
        .map_err(|e| RecordError::Backup {
            key: key.to_string(),
            reason: format!("{:#}", e),
        })
    }

    async fn upload(
        &self,
        record: &SubmissionRecord,
        artifacts: &[ImageArtifact],
    ) -> Result<ObservationId, RecordError> {
        // Checked before anything is created, so a bad id cannot leave a
        // half-built observation behind
        let fields = coerce_field_ids(record)?;

        let observation_id = timed(
            self.config.call_timeout,
            self.destination
                .create_observation(&new_observation(record)),
        )
        .await
        .map_err(|e| RecordError::Upload {
            reason: format!("creating observation: {:#}", e),
            observation: None,
        })?;

        for artifact in artifacts {
            timed(
                self.config.call_timeout,
                self.destination.attach_image(observation_id, &artifact.path),
            )
            .await
            .map_err(|e| RecordError::Upload {
                reason: format!("attaching image {}: {:#}", artifact.image_ref, e),
                observation: Some(observation_id),
            })?;
        }

        for (field_id, value) in fields {
            timed(
                self.config.call_timeout,
                self.destination
                    .attach_field(observation_id, field_id, value),
            )
            .await
            .map_err(|e| RecordError::Upload {
                reason: format!("attaching field {}: {:#}", field_id, e),
                observation: Some(observation_id),
            })?;
        }

        Ok(observation_id)
    }
}

/// Delete the job's descriptors unless some record is still outstanding
///
/// Individual delete failures are reported, not fatal: every record is
/// already migrated, and a leftover descriptor only names instances that no
/// longer exist at the source.
pub async fn release_descriptors(
    config: &MigratorConfig,
    store: &dyn BlobStore,
    job: &Job,
    records: &[RecordReport],
) -> DescriptorCleanup {
    let outstanding = records
        .iter()
        .filter(|r| r.status.is_outstanding())
        .count();
    if outstanding > 0 {
        warn!(
            identity = %job.identity,
            outstanding,
            descriptors = job.descriptor_keys.len(),
            "Keeping job descriptors for records not yet migrated"
        );
        return DescriptorCleanup::Retained {
            reason: format!("{} record(s) not migrated", outstanding),
        };
    }

    let mut deleted = Vec::new();
    let mut failures = Vec::new();
    for key in &job.descriptor_keys {
        match timed(config.call_timeout, store.delete(&config.job_bucket, key)).await {
            Ok(()) => {
                metrics::record_descriptor_deleted();
                deleted.push(key.clone());
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(key = %key, error = %reason, "Failed to delete job descriptor");
                metrics::record_cleanup_failure();
                failures.push(DeleteFailed {
                    target: key.clone(),
                    reason,
                });
            }
        }
    }

    if failures.is_empty() {
        info!(identity = %job.identity, deleted = deleted.len(), "Job descriptors deleted");
        DescriptorCleanup::Deleted { keys: deleted }
    } else {
        DescriptorCleanup::Partial {
            deleted,
            failed: failures,
        }
    }
}

fn failed(error: RecordError) -> RecordStatus {
    RecordStatus::Failed {
        step: error.step(),
        observation_id: error.observation(),
        error: error.to_string(),
    }
}

/// Run `fut` with a time limit
async fn timed<T, E, F>(limit: Duration, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(anyhow::anyhow!("timed out after {:?}", limit)),
    }
}

/// Observation fields keyed by numeric id, in id order
pub fn coerce_field_ids(
    record: &SubmissionRecord,
) -> Result<Vec<(u64, &serde_json::Value)>, RecordError> {
    let mut fields = record
        .observation_fields
        .iter()
        .map(|(key, value)| {
            key.trim()
                .parse::<u64>()
                .map(|id| (id, value))
                .map_err(|_| RecordError::InvalidFieldId(key.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    fields.sort_by_key(|(id, _)| *id);
    Ok(fields)
}

/// The observation to create for `record`
///
/// A numeric taxon is a platform taxon id; anything else is free text used
/// as the species guess.
pub fn new_observation(record: &SubmissionRecord) -> NewObservation {
    let (taxon_id, species_guess) = match &record.taxa {
        Taxon::Id(id) => (Some(*id), None),
        Taxon::Name(name) => (None, Some(name.clone())),
    };

    NewObservation {
        taxon_id,
        species_guess,
        longitude: record.longitude,
        latitude: record.latitude,
        observed_on_string: record.timestamp.clone(),
        positional_accuracy: record.positional_accuracy,
        description: record.notes.clone(),
    }
}

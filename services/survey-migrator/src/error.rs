// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Error types for the migrator
//!
//! [`JobError`] aborts a whole job. [`RecordError`] is confined to the record
//! it happened on and ends up in that record's report entry.

use blob_store::BlobStoreError;
use inaturalist_client::ObservationId;
use serde::Serialize;
use strum::Display;
use thiserror::Error;

/// Errors that stop a job before or instead of migrating its records
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Malformed job descriptor {key}: {reason}")]
    MalformedDescriptor { key: String, reason: String },

    #[error("Failed to fetch submissions: {0}")]
    FetchFailed(String),

    #[error("Failed to connect to {platform}: {reason}")]
    ClientSetup {
        platform: &'static str,
        reason: String,
    },

    #[error("Job store error: {0}")]
    Store(#[from] BlobStoreError),
}

/// The stage of a record's migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordStep {
    Decode,
    Materialize,
    Backup,
    Upload,
    SourceCleanup,
}

/// A failure migrating one record
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Malformed submission: {0}")]
    Malformed(String),

    #[error("Failed to pull submission: {0}")]
    InstancePull(String),

    #[error("Failed to prepare scratch space: {0}")]
    Scratch(String),

    #[error("Failed to pull image {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Backup of {key} failed: {reason}")]
    Backup { key: String, reason: String },

    #[error("Invalid observation field id {0:?}")]
    InvalidFieldId(String),

    #[error("Upload failed: {reason}")]
    Upload {
        reason: String,
        observation: Option<ObservationId>,
    },
}

impl RecordError {
    pub fn step(&self) -> RecordStep {
        match self {
            RecordError::Malformed(_) => RecordStep::Decode,
            RecordError::InstancePull(_)
            | RecordError::Scratch(_)
            | RecordError::ImagePull { .. } => RecordStep::Materialize,
            RecordError::Backup { .. } => RecordStep::Backup,
            RecordError::InvalidFieldId(_) | RecordError::Upload { .. } => RecordStep::Upload,
        }
    }

    /// The observation left behind on the destination, if the upload got
    /// far enough to create one.
    pub fn observation(&self) -> Option<ObservationId> {
        match self {
            RecordError::Upload { observation, .. } => *observation,
            _ => None,
        }
    }
}

/// A delete that did not go through
///
/// Never fatal: the data it concerns is already safe elsewhere.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("Failed to delete {target}: {reason}")]
pub struct DeleteFailed {
    pub target: String,
    pub reason: String,
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Bucketed key/value object storage.
//!
//! The migrator keeps two kinds of objects: job descriptors (read, listed by
//! prefix, deleted once a job completes) and backups (written once). Both go
//! through the [`BlobStore`] trait so the pipeline does not care where the
//! bytes end up.
//!
//! # Modules
//!
//! - [`s3`] - S3 (or S3-compatible) object storage; the production store
//! - [`fs`] - Directory-backed store; one directory per bucket
//! - [`memory`] - In-process store used by tests and dry runs
//!
//! Buckets must exist before objects are written to them. Keys are
//! `/`-separated paths; empty, `.` and `..` segments are rejected so a key
//! can never address anything outside its bucket.

pub mod fs;
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("Invalid object key: {0:?}")]
    InvalidKey(String),
    #[error("Invalid bucket name: {0:?}")]
    InvalidBucket(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object storage error: {0}")]
    Backend(String),
}

/// Key/value object storage addressed by `(bucket, key)`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read an object
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, BlobStoreError>;

    /// Create or replace an object
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), BlobStoreError>;

    /// Remove an object. Removing a missing object succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError>;

    /// List the keys in `bucket` starting with `prefix`, sorted
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, BlobStoreError>;
}

/// Split a key into its path segments, rejecting keys that could escape
/// the bucket.
pub(crate) fn key_segments(key: &str) -> Result<Vec<&str>, BlobStoreError> {
    if key.is_empty() || key.starts_with('/') {
        return Err(BlobStoreError::InvalidKey(key.to_string()));
    }

    let segments: Vec<&str> = key.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(BlobStoreError::InvalidKey(key.to_string()));
    }

    Ok(segments)
}

pub(crate) fn validate_bucket(bucket: &str) -> Result<(), BlobStoreError> {
    if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains(['/', '\\']) {
        return Err(BlobStoreError::InvalidBucket(bucket.to_string()));
    }
    Ok(())
}

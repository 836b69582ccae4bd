// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Directory-backed object store
//!
//! Each bucket is a directory under the store root and each key is a path
//! relative to its bucket. Writes go to a sibling partial file first and are
//! renamed into place, so a reader never sees a half-written object.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::{BlobStore, BlobStoreError, key_segments, validate_bucket};

/// Suffix of in-flight writes; never reported by `list`
const PARTIAL_SUFFIX: &str = ".blobstore-partial";

/// Object store rooted at a local (or mounted) directory
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<(), BlobStoreError> {
        validate_bucket(bucket)?;
        fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    /// Resolve the bucket directory, failing if it does not exist
    async fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, BlobStoreError> {
        validate_bucket(bucket)?;
        let dir = self.root.join(bucket);
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(BlobStoreError::BucketNotFound(bucket.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(BlobStoreError::BucketNotFound(bucket.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, BlobStoreError> {
        let segments = key_segments(key)?;
        let mut path = self.bucket_dir(bucket).await?;
        path.extend(segments);
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, BlobStoreError> {
        let path = self.object_path(bucket, key).await?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), BlobStoreError> {
        let path = self.object_path(bucket, key).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut partial = path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        let mut file = fs::File::create(&partial).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&partial, &path).await {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                warn!(
                    path = %partial.display(),
                    error = %cleanup,
                    "Failed to remove partial object"
                );
            }
            return Err(e.into());
        }

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError> {
        let path = self.object_path(bucket, key).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        let bucket_dir = self.bucket_dir(bucket).await?;
        let mut keys = Vec::new();

        // (directory, key prefix of entries inside it)
        let mut pending = vec![(bucket_dir, String::new())];
        while let Some((dir, dir_key)) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    warn!(path = %entry.path().display(), "Skipping non UTF-8 object name");
                    continue;
                };
                let key = format!("{}{}", dir_key, name);

                if entry.file_type().await?.is_dir() {
                    // Only descend where a matching key could live
                    let child = format!("{}/", key);
                    if child.starts_with(prefix) || prefix.starts_with(&child) {
                        pending.push((entry.path(), child));
                    }
                } else if !name.ends_with(PARTIAL_SUFFIX) && key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

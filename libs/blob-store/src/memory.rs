// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! In-memory object store

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::{BlobStore, BlobStoreError, key_segments, validate_bucket};

type Bucket = BTreeMap<String, Bytes>;

/// Object store held entirely in memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given (empty) buckets
    pub fn with_buckets<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buckets = names
            .into_iter()
            .map(|name| (name.into(), Bucket::new()))
            .collect();
        Self {
            buckets: RwLock::new(buckets),
        }
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<(), BlobStoreError> {
        validate_bucket(bucket)?;
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    /// Whether `key` currently exists in `bucket`
    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        self.buckets
            .read()
            .await
            .get(bucket)
            .is_some_and(|b| b.contains_key(key))
    }

    /// Number of objects in `bucket` (zero for a missing bucket)
    pub async fn len(&self, bucket: &str) -> usize {
        self.buckets.read().await.get(bucket).map_or(0, |b| b.len())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, BlobStoreError> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| BlobStoreError::BucketNotFound(bucket.to_string()))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), BlobStoreError> {
        key_segments(key)?;
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobStoreError::BucketNotFound(bucket.to_string()))?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobStoreError::BucketNotFound(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| BlobStoreError::BucketNotFound(bucket.to_string()))?;

        // BTreeMap keys are already sorted
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryBlobStore::with_buckets(["jobs"]);

        store
            .put("jobs", "a@example.com-1", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(
            store.get("jobs", "a@example.com-1").await.unwrap(),
            Bytes::from_static(b"{}")
        );

        store.delete("jobs", "a@example.com-1").await.unwrap();
        assert!(matches!(
            store.get("jobs", "a@example.com-1").await,
            Err(BlobStoreError::NotFound { .. })
        ));

        // Deleting again is not an error
        store.delete("jobs", "a@example.com-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = MemoryBlobStore::with_buckets(["jobs"]);
        for key in ["a@example.com-2", "a@example.com-1", "b@example.com-1"] {
            store.put("jobs", key, Bytes::new()).await.unwrap();
        }

        let keys = store.list("jobs", "a@example.com").await.unwrap();
        assert_eq!(keys, vec!["a@example.com-1", "a@example.com-2"]);
        assert!(store.list("jobs", "c@").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.put("nope", "k", Bytes::new()).await,
            Err(BlobStoreError::BucketNotFound(_))
        ));
        assert!(matches!(
            store.list("nope", "").await,
            Err(BlobStoreError::BucketNotFound(_))
        ));

        store.create_bucket("nope").await.unwrap();
        store.put("nope", "k", Bytes::new()).await.unwrap();
        assert_eq!(store.len("nope").await, 1);
    }
}

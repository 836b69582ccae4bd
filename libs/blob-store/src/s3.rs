// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! S3 object store
//!
//! Buckets and keys map one to one onto S3 buckets and object keys.
//! Credentials and region come from the standard AWS environment
//! (`AWS_ACCESS_KEY_ID`, `AWS_REGION`, profiles, instance metadata). An
//! explicit endpoint selects an S3-compatible service and switches to
//! path-style addressing.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::debug;

use crate::{BlobStore, BlobStoreError, key_segments, validate_bucket};

/// Object store over an S3 client
#[derive(Clone, Debug)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the AWS environment, optionally pointed at
    /// `endpoint_url` instead of AWS itself.
    pub async fn from_env(endpoint_url: Option<&str>) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url).force_path_style(true);
        }

        debug!(endpoint = ?endpoint_url, "Created S3 client");
        Self::new(Client::from_conf(builder.build()))
    }
}

/// Map an SDK failure onto the store's error type
fn store_error<E>(err: SdkError<E>, bucket: &str, key: &str) -> BlobStoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code = err.as_service_error().and_then(|e| e.code());
    match code {
        Some("NoSuchBucket") => BlobStoreError::BucketNotFound(bucket.to_string()),
        Some("NoSuchKey") => BlobStoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => BlobStoreError::Backend(format!(
            "{}/{}: {}",
            bucket,
            key,
            DisplayErrorContext(&err)
        )),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, BlobStoreError> {
        validate_bucket(bucket)?;
        key_segments(key)?;

        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error(e, bucket, key))?;

        let body = object
            .body
            .collect()
            .await
            .map_err(|e| BlobStoreError::Backend(format!("{}/{}: {}", bucket, key, e)))?;
        Ok(body.into_bytes())
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), BlobStoreError> {
        validate_bucket(bucket)?;
        key_segments(key)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| store_error(e, bucket, key))?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError> {
        validate_bucket(bucket)?;
        key_segments(key)?;

        // S3 reports success for keys that do not exist
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error(e, bucket, key))?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        validate_bucket(bucket)?;

        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }
            if let Some(t) = token.as_deref() {
                request = request.continuation_token(t);
            }

            let page = request
                .send()
                .await
                .map_err(|e| store_error(e, bucket, prefix))?;

            keys.extend(
                page.contents
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|object| object.key)
                    .filter(|key| !key.ends_with('/')),
            );

            match page.next_continuation_token {
                Some(next) if page.is_truncated.unwrap_or(false) => token = Some(next),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }
}

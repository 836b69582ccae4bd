// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

// Allow expect/unwrap in tests - they provide clear panic messages on failure
#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

//! Shared fakes for the migrator integration tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use blob_store::{BlobStore, BlobStoreError, MemoryBlobStore};
use bytes::Bytes;
use inaturalist_client::{NewObservation, ObservationId};
use secrecy::SecretString;
use serde_json::{Value, json};
use survey_migration_types::{InstanceId, SubmissionRecord};
use survey_migrator::MigratorConfig;
use survey_migrator::jobs::{DestinationCredentials, Job, SourceCredentials};
use survey_migrator::platform::{DestinationPlatform, PlatformConnector, SourcePlatform};
use tempfile::TempDir;

pub const JOB_BUCKET: &str = "migrate-test-job";
pub const BACKUP_BUCKET: &str = "migrate-test-backup";
pub const ACCOUNT: &str = "aXk3";
pub const IDENTITY: &str = "someone@example.com";

// ============================================================================
// Records and jobs
// ============================================================================

/// A submission with the given images, noted with its own instance id
pub fn submission(instance: &str, images: &[&str]) -> SubmissionRecord {
    serde_json::from_value(json!({
        "instance": instance,
        "images": images,
        "taxa": 47126,
        "longitude": -1.5,
        "latitude": 52.25,
        "ts": "2024-05-01T10:00:00Z",
        "notes": format!("record {}", instance),
    }))
    .unwrap()
}

/// The JSON a descriptor for `instances` is stored as
pub fn descriptor_json(instances: &[&str]) -> Value {
    json!({
        "kobo_username": "surveyor",
        "kobo_password": "hunter2",
        "kobo_uid": ACCOUNT,
        "inaturalist_email": IDENTITY,
        "inaturalist_password": "pw",
        "client_id": "cid",
        "client_secret": "cs",
        "instances": instances,
    })
}

pub fn job(instances: &[&str], descriptor_keys: &[&str]) -> Job {
    Job {
        identity: IDENTITY.to_string(),
        source: SourceCredentials {
            username: "surveyor".to_string(),
            password: SecretString::from("hunter2".to_string()),
            account_id: ACCOUNT.to_string(),
        },
        destination: DestinationCredentials {
            identity: IDENTITY.to_string(),
            password: SecretString::from("pw".to_string()),
            client_id: "cid".to_string(),
            client_secret: SecretString::from("cs".to_string()),
        },
        instance_ids: instances.iter().map(|i| InstanceId::from(*i)).collect(),
        descriptor_keys: descriptor_keys.iter().map(|k| k.to_string()).collect(),
    }
}

pub fn config(work_dir: &Path) -> MigratorConfig {
    MigratorConfig {
        job_bucket: JOB_BUCKET.to_string(),
        backup_bucket: BACKUP_BUCKET.to_string(),
        submissions_api_url: "http://127.0.0.1:1".to_string(),
        inaturalist_api_url: "http://127.0.0.1:1/v1".to_string(),
        inaturalist_webapp_url: "http://127.0.0.1:1".to_string(),
        work_dir: work_dir.to_path_buf(),
        call_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// The bytes the fake source serves for `image` of `instance`
pub fn image_bytes(instance: &str, image: &str) -> Vec<u8> {
    format!("jpeg:{}:{}", instance, image).into_bytes()
}

/// Number of entries left in a scratch directory
pub fn scratch_entries(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

// ============================================================================
// Source
// ============================================================================

#[derive(Default)]
struct SourceState {
    payloads: BTreeMap<String, Value>,
    images: HashMap<(String, String), Vec<u8>>,
    deleted: Vec<String>,
    failing_deletes: HashSet<String>,
    instance_pulls: usize,
}

/// In-memory survey backend
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
}

impl FakeSource {
    /// Serve `record` with its images
    pub fn add(&self, record: &SubmissionRecord) {
        let instance = record.instance_id.as_str().to_string();
        let mut state = self.state.lock().unwrap();
        for image in &record.images {
            state.images.insert(
                (instance.clone(), image.clone()),
                image_bytes(&instance, image),
            );
        }
        let mut payload = serde_json::to_value(record).unwrap();
        payload["_id"] = json!(instance);
        state.payloads.insert(instance, payload);
    }

    /// Stop serving one image, so pulling it fails
    pub fn remove_image(&self, instance: &str, image: &str) {
        self.state
            .lock()
            .unwrap()
            .images
            .remove(&(instance.to_string(), image.to_string()));
    }

    pub fn fail_delete_of(&self, instance: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(instance.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Number of payload fetches served so far
    pub fn instance_pulls(&self) -> usize {
        self.state.lock().unwrap().instance_pulls
    }

    pub fn has(&self, instance: &str) -> bool {
        self.state.lock().unwrap().payloads.contains_key(instance)
    }

    pub fn payload(&self, instance: &str) -> Value {
        self.state.lock().unwrap().payloads[instance].clone()
    }
}

#[async_trait]
impl SourcePlatform for FakeSource {
    async fn pull_instance(&self, _account_id: &str, instance: &InstanceId) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.instance_pulls += 1;
        state
            .payloads
            .get(instance.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("instance {} not found", instance))
    }

    async fn pull_image(
        &self,
        _payload: &Value,
        instance: &InstanceId,
        image: &str,
        dest: &Path,
    ) -> Result<u64> {
        let data = self
            .state
            .lock()
            .unwrap()
            .images
            .get(&(instance.as_str().to_string(), image.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("attachment {} not found", image))?;
        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }

    async fn delete_instance(&self, _account_id: &str, instance: &InstanceId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_deletes.contains(instance.as_str()) {
            return Err(anyhow!("503 Service Unavailable"));
        }
        state.payloads.remove(instance.as_str());
        state.deleted.push(instance.as_str().to_string());
        Ok(())
    }
}

// ============================================================================
// Destination
// ============================================================================

#[derive(Default)]
struct DestinationState {
    observations: Vec<NewObservation>,
    images: Vec<(ObservationId, Vec<u8>)>,
    fields: Vec<(ObservationId, u64, Value)>,
    failing_descriptions: HashSet<String>,
}

/// In-memory observation platform; ids start at 1000
#[derive(Clone, Default)]
pub struct FakeDestination {
    state: Arc<Mutex<DestinationState>>,
}

impl FakeDestination {
    /// Reject creating observations whose description is `description`
    pub fn fail_create_for(&self, description: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_descriptions
            .insert(description.to_string());
    }

    pub fn observations(&self) -> Vec<NewObservation> {
        self.state.lock().unwrap().observations.clone()
    }

    pub fn images(&self) -> Vec<(ObservationId, Vec<u8>)> {
        self.state.lock().unwrap().images.clone()
    }

    pub fn fields(&self) -> Vec<(ObservationId, u64, Value)> {
        self.state.lock().unwrap().fields.clone()
    }
}

#[async_trait]
impl DestinationPlatform for FakeDestination {
    async fn create_observation(&self, observation: &NewObservation) -> Result<ObservationId> {
        let mut state = self.state.lock().unwrap();
        if let Some(description) = &observation.description
            && state.failing_descriptions.contains(description)
        {
            return Err(anyhow!("422 Unprocessable Entity"));
        }
        state.observations.push(observation.clone());
        Ok(999 + state.observations.len() as ObservationId)
    }

    async fn attach_image(&self, observation: ObservationId, image: &Path) -> Result<()> {
        let data = tokio::fs::read(image).await?;
        self.state.lock().unwrap().images.push((observation, data));
        Ok(())
    }

    async fn attach_field(
        &self,
        observation: ObservationId,
        field_id: u64,
        value: &Value,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .fields
            .push((observation, field_id, value.clone()));
        Ok(())
    }
}

// ============================================================================
// Connector
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub source: FakeSource,
    pub destination: FakeDestination,
    connects: Arc<AtomicUsize>,
    reject: bool,
}

impl FakeConnector {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    /// Number of platform connections made so far
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformConnector for FakeConnector {
    type Source = FakeSource;
    type Destination = FakeDestination;

    async fn connect_source(&self, _credentials: &SourceCredentials) -> Result<FakeSource> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(anyhow!("Authentication rejected"));
        }
        Ok(self.source.clone())
    }

    async fn connect_destination(
        &self,
        _credentials: &DestinationCredentials,
    ) -> Result<FakeDestination> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.destination.clone())
    }
}

// ============================================================================
// Store
// ============================================================================

/// Memory store that fails chosen writes and deletes
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryBlobStore,
    failing_put_prefixes: Mutex<Vec<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryBlobStore::with_buckets([JOB_BUCKET, BACKUP_BUCKET]),
            ..Default::default()
        }
    }

    pub fn fail_puts_under(&self, prefix: &str) {
        self.failing_put_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    /// Store descriptors for `instances` under each key
    pub async fn put_descriptor(&self, key: &str, instances: &[&str]) {
        self.inner
            .put(
                JOB_BUCKET,
                key,
                Bytes::from(descriptor_json(instances).to_string()),
            )
            .await
            .unwrap();
    }

    pub async fn backup_keys(&self) -> Vec<String> {
        self.inner.list(BACKUP_BUCKET, "").await.unwrap()
    }

    pub async fn job_keys(&self) -> Vec<String> {
        self.inner.list(JOB_BUCKET, "").await.unwrap()
    }
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, BlobStoreError> {
        self.inner.get(bucket, key).await
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), BlobStoreError> {
        let failing = self
            .failing_put_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|p| key.starts_with(p.as_str()));
        if failing {
            return Err(BlobStoreError::Io(std::io::Error::other("injected write failure")));
        }
        self.inner.put(bucket, key, body).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError> {
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(BlobStoreError::Io(std::io::Error::other("injected delete failure")));
        }
        self.inner.delete(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        self.inner.list(bucket, prefix).await
    }
}

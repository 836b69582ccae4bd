// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Platform seams
//!
//! The pipeline talks to the survey backend and the observation platform
//! only through [`SourcePlatform`] and [`DestinationPlatform`], and obtains
//! them through a [`PlatformConnector`]. Production uses the HTTP clients;
//! tests substitute in-memory fakes.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use inaturalist_client::{Credentials, InaturalistClient, NewObservation, ObservationId};
use kobo_client::KoboClient;
use survey_migration_types::InstanceId;

use crate::config::MigratorConfig;
use crate::jobs::{DestinationCredentials, SourceCredentials};

/// Where submissions come from
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    /// Full JSON payload of one submission
    async fn pull_instance(
        &self,
        account_id: &str,
        instance: &InstanceId,
    ) -> Result<serde_json::Value>;

    /// Download attachment `image` of a submission to `dest`, resolving it
    /// through the submission's `payload` from [`Self::pull_instance`]
    async fn pull_image(
        &self,
        payload: &serde_json::Value,
        instance: &InstanceId,
        image: &str,
        dest: &Path,
    ) -> Result<u64>;

    async fn delete_instance(&self, account_id: &str, instance: &InstanceId) -> Result<()>;
}

/// Where observations are created
#[async_trait]
pub trait DestinationPlatform: Send + Sync {
    async fn create_observation(&self, observation: &NewObservation) -> Result<ObservationId>;

    async fn attach_image(&self, observation: ObservationId, image: &Path) -> Result<()>;

    async fn attach_field(
        &self,
        observation: ObservationId,
        field_id: u64,
        value: &serde_json::Value,
    ) -> Result<()>;
}

/// Builds authenticated platform handles from a job's credentials
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    type Source: SourcePlatform;
    type Destination: DestinationPlatform;

    async fn connect_source(&self, credentials: &SourceCredentials) -> Result<Self::Source>;

    async fn connect_destination(
        &self,
        credentials: &DestinationCredentials,
    ) -> Result<Self::Destination>;
}

// ============================================================================
// HTTP implementations
// ============================================================================

#[async_trait]
impl SourcePlatform for KoboClient {
    async fn pull_instance(
        &self,
        account_id: &str,
        instance: &InstanceId,
    ) -> Result<serde_json::Value> {
        Ok(KoboClient::pull_instance(self, account_id, instance.as_str()).await?)
    }

    async fn pull_image(
        &self,
        payload: &serde_json::Value,
        instance: &InstanceId,
        image: &str,
        dest: &Path,
    ) -> Result<u64> {
        Ok(KoboClient::pull_image(self, payload, instance.as_str(), image, dest).await?)
    }

    async fn delete_instance(&self, account_id: &str, instance: &InstanceId) -> Result<()> {
        Ok(KoboClient::delete_instance(self, account_id, instance.as_str()).await?)
    }
}

#[async_trait]
impl DestinationPlatform for InaturalistClient {
    async fn create_observation(&self, observation: &NewObservation) -> Result<ObservationId> {
        Ok(InaturalistClient::create_observation(self, observation).await?)
    }

    async fn attach_image(&self, observation: ObservationId, image: &Path) -> Result<()> {
        Ok(InaturalistClient::attach_image(self, observation, image).await?)
    }

    async fn attach_field(
        &self,
        observation: ObservationId,
        field_id: u64,
        value: &serde_json::Value,
    ) -> Result<()> {
        Ok(self
            .attach_observation_field(observation, field_id, value)
            .await?)
    }
}

/// Connects to the real platforms over HTTP
pub struct HttpConnector<'a> {
    config: &'a MigratorConfig,
}

impl<'a> HttpConnector<'a> {
    pub fn new(config: &'a MigratorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PlatformConnector for HttpConnector<'_> {
    type Source = KoboClient;
    type Destination = InaturalistClient;

    async fn connect_source(&self, credentials: &SourceCredentials) -> Result<KoboClient> {
        Ok(KoboClient::connect(
            &self.config.kobo_url,
            &credentials.username,
            &credentials.password,
            self.config.call_timeout,
        )
        .await?)
    }

    async fn connect_destination(
        &self,
        credentials: &DestinationCredentials,
    ) -> Result<InaturalistClient> {
        Ok(InaturalistClient::connect(
            &self.config.inaturalist_api_url,
            &self.config.inaturalist_webapp_url,
            &Credentials {
                username: &credentials.identity,
                password: &credentials.password,
                client_id: &credentials.client_id,
                client_secret: &credentials.client_secret,
            },
            self.config.call_timeout,
        )
        .await?)
    }
}

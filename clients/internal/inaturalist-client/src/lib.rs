// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! iNaturalist client
//!
//! Authentication is a two-step exchange against the web application: an
//! OAuth resource-owner password grant yields an access token, which is then
//! traded for a JSON Web Token accepted by the v1 API. Everything after
//! [`InaturalistClient::connect`] talks to the API only.

use std::path::Path;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Identifier of an observation on the platform
pub type ObservationId = u64;

#[derive(Error, Debug)]
pub enum InaturalistError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication rejected by {0}")]
    AuthRejected(String),

    #[error("Unexpected status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Account and OAuth application used to act on the user's behalf
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a SecretString,
    pub client_id: &'a str,
    pub client_secret: &'a SecretString,
}

/// Fields of a new observation
///
/// Exactly one of `taxon_id` and `species_guess` is normally set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewObservation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxon_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species_guess: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub observed_on_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positional_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Serialize)]
struct ObservationEnvelope<'a> {
    observation: &'a NewObservation,
}

#[derive(Serialize)]
struct FieldValueEnvelope<'a> {
    observation_field_value: FieldValue<'a>,
}

#[derive(Serialize)]
struct FieldValue<'a> {
    observation_id: ObservationId,
    observation_field_id: u64,
    value: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Deserialize)]
struct ApiToken {
    api_token: String,
}

#[derive(Deserialize)]
struct Created {
    id: ObservationId,
}

/// Authenticated iNaturalist API client
#[derive(Clone, Debug)]
pub struct InaturalistClient {
    client: Client,
    api_url: Url,
}

impl InaturalistClient {
    /// Authenticate through `webapp_url` and return a client for `api_url`
    pub async fn connect(
        api_url: &str,
        webapp_url: &str,
        credentials: &Credentials<'_>,
        timeout: Duration,
    ) -> Result<Self, InaturalistError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let api_url = parse_url(api_url)?;
        let webapp_url = parse_url(webapp_url)?;
        let bootstrap = Client::builder().timeout(timeout).build()?;

        let token_url = endpoint(&webapp_url, &["oauth", "token"])?;
        let response = bootstrap
            .post(token_url.clone())
            .form(&[
                ("client_id", credentials.client_id),
                ("client_secret", credentials.client_secret.expose_secret()),
                ("grant_type", "password"),
                ("username", credentials.username),
                ("password", credentials.password.expose_secret()),
            ])
            .send()
            .await?;
        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(InaturalistError::AuthRejected(webapp_url.to_string()));
        }
        let access: AccessToken = check_status(response, &token_url).await?.json().await?;

        let api_token_url = endpoint(&webapp_url, &["users", "api_token"])?;
        let response = bootstrap
            .get(api_token_url.clone())
            .bearer_auth(&access.access_token)
            .send()
            .await?;
        let api_token: ApiToken = check_status(response, &api_token_url).await?.json().await?;

        let mut auth = HeaderValue::from_str(&api_token.api_token)
            .map_err(|e| InaturalistError::InvalidResponse(format!("unusable API token: {}", e)))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        tracing::debug!(
            api_url = %api_url,
            username = credentials.username,
            "Authenticated with iNaturalist"
        );

        Ok(Self { client, api_url })
    }

    /// Create an observation without media, returning its id
    pub async fn create_observation(
        &self,
        observation: &NewObservation,
    ) -> Result<ObservationId, InaturalistError> {
        let url = endpoint(&self.api_url, &["observations"])?;
        let response = self
            .client
            .post(url.clone())
            .json(&ObservationEnvelope { observation })
            .send()
            .await?;
        let created: Created = check_status(response, &url).await?.json().await?;
        Ok(created.id)
    }

    /// Upload the JPEG at `image` as a photo of `observation`
    pub async fn attach_image(
        &self,
        observation: ObservationId,
        image: &Path,
    ) -> Result<(), InaturalistError> {
        let data = tokio::fs::read(image).await?;
        let file_name = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("photo.jpg")
            .to_string();

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .text("observation_photo[observation_id]", observation.to_string())
            .part("file", part);

        let url = endpoint(&self.api_url, &["observation_photos"])?;
        let response = self.client.post(url.clone()).multipart(form).send().await?;
        check_status(response, &url).await?;
        Ok(())
    }

    /// Set observation field `field_id` to `value` on `observation`
    pub async fn attach_observation_field(
        &self,
        observation: ObservationId,
        field_id: u64,
        value: &serde_json::Value,
    ) -> Result<(), InaturalistError> {
        let url = endpoint(&self.api_url, &["observation_field_values"])?;
        let body = FieldValueEnvelope {
            observation_field_value: FieldValue {
                observation_id: observation,
                observation_field_id: field_id,
                value,
            },
        };
        let response = self.client.post(url.clone()).json(&body).send().await?;
        check_status(response, &url).await?;
        Ok(())
    }
}

fn parse_url(s: &str) -> Result<Url, InaturalistError> {
    Url::parse(s).map_err(|e| InaturalistError::InvalidUrl(format!("{}: {}", s, e)))
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, InaturalistError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| InaturalistError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn check_status(
    response: reqwest::Response,
    url: &Url,
) -> Result<reqwest::Response, InaturalistError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    // The body usually explains validation failures
    let body = response.text().await.unwrap_or_default();
    Err(InaturalistError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

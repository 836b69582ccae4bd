// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! KoboToolbox client
//!
//! A thin wrapper over the KPI v2 REST API covering what a migration needs:
//! reading one submission, downloading its attachments and deleting it.
//!
//! Authentication exchanges the account's username and password for an API
//! token once, in [`KoboClient::connect`]; every later request carries
//! `Authorization: Token {token}`.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Error, Debug)]
pub enum KoboError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication rejected by {0}")]
    AuthRejected(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Attachment {image} not found on instance {instance}")]
    AttachmentNotFound { instance: String, image: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// One entry of a submission's `_attachments` array
#[derive(Debug, Deserialize)]
struct Attachment {
    filename: String,
    download_url: String,
}

/// Authenticated KoboToolbox client
#[derive(Clone, Debug)]
pub struct KoboClient {
    client: Client,
    base_url: Url,
}

impl KoboClient {
    /// Authenticate against `base_url` and return a client carrying the
    /// account's API token.
    pub async fn connect(
        base_url: &str,
        username: &str,
        password: &SecretString,
        timeout: Duration,
    ) -> Result<Self, KoboError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let base_url =
            Url::parse(base_url).map_err(|e| KoboError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let bootstrap = Client::builder().timeout(timeout).build()?;
        let mut token_url = endpoint(&base_url, &["token", ""])?;
        token_url.query_pairs_mut().append_pair("format", "json");

        let response = bootstrap
            .get(token_url.clone())
            .basic_auth(username, Some(password.expose_secret()))
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(KoboError::AuthRejected(base_url.to_string()));
            }
            status if !status.is_success() => {
                return Err(KoboError::Status {
                    status: status.as_u16(),
                    url: token_url.to_string(),
                });
            }
            _ => {}
        }

        let token: TokenResponse = response.json().await?;

        let mut auth = HeaderValue::from_str(&format!("Token {}", token.token))
            .map_err(|e| KoboError::InvalidResponse(format!("unusable API token: {}", e)))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        tracing::debug!(base_url = %base_url, username, "Authenticated with KoboToolbox");

        Ok(Self { client, base_url })
    }

    /// Fetch the full JSON payload of one submission
    pub async fn pull_instance(
        &self,
        asset_uid: &str,
        instance: &str,
    ) -> Result<serde_json::Value, KoboError> {
        let mut url = self.instance_url(asset_uid, instance)?;
        url.query_pairs_mut().append_pair("format", "json");

        let response = self.client.get(url.clone()).send().await?;
        let response = check_status(response, &url)?;
        Ok(response.json().await?)
    }

    /// Download the attachment named `image` of a submission to `dest`,
    /// returning the number of bytes written.
    ///
    /// `record` is the submission payload from [`KoboClient::pull_instance`];
    /// its `_attachments` list says where each file lives, so one payload
    /// fetch serves every image of the submission. `image` is the attachment's
    /// base file name as listed in the question answers; the stored name
    /// carries a directory prefix, so the match is on the final path
    /// component.
    pub async fn pull_image(
        &self,
        record: &serde_json::Value,
        instance: &str,
        image: &str,
        dest: &Path,
    ) -> Result<u64, KoboError> {
        let attachments: Vec<Attachment> = match record.get("_attachments") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| KoboError::InvalidResponse(format!("_attachments: {}", e)))?,
            None => Vec::new(),
        };

        let attachment = attachments
            .iter()
            .find(|a| attachment_matches(&a.filename, image))
            .ok_or_else(|| KoboError::AttachmentNotFound {
                instance: instance.to_string(),
                image: image.to_string(),
            })?;

        let url = self
            .base_url
            .join(&attachment.download_url)
            .map_err(|e| KoboError::InvalidUrl(format!("{}: {}", attachment.download_url, e)))?;

        let response = self.client.get(url.clone()).send().await?;
        let response = check_status(response, &url)?;

        let mut file = File::create(dest).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(
            instance,
            image,
            bytes = written,
            path = %dest.display(),
            "Downloaded attachment"
        );

        Ok(written)
    }

    /// Delete one submission
    pub async fn delete_instance(&self, asset_uid: &str, instance: &str) -> Result<(), KoboError> {
        let url = self.instance_url(asset_uid, instance)?;
        let response = self.client.delete(url.clone()).send().await?;
        check_status(response, &url)?;
        Ok(())
    }

    fn instance_url(&self, asset_uid: &str, instance: &str) -> Result<Url, KoboError> {
        endpoint(
            &self.base_url,
            &["api", "v2", "assets", asset_uid, "data", instance, ""],
        )
    }
}

/// Append path segments to `base`; a trailing empty segment yields the
/// trailing slash KPI expects.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, KoboError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| KoboError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn check_status(response: reqwest::Response, url: &Url) -> Result<reqwest::Response, KoboError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(KoboError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

fn attachment_matches(filename: &str, image: &str) -> bool {
    filename == image || filename.rsplit('/').next() == Some(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_matches_final_component() {
        assert!(attachment_matches(
            "surveyor/attachments/abc/uuid/photo_1.jpg",
            "photo_1.jpg"
        ));
        assert!(attachment_matches("photo_1.jpg", "photo_1.jpg"));
        assert!(!attachment_matches(
            "surveyor/attachments/abc/uuid/photo_11.jpg",
            "photo_1.jpg"
        ));
    }

    #[test]
    fn test_endpoint_keeps_base_path() -> Result<(), KoboError> {
        let base = Url::parse("https://kf.example.org/kpi/").map_err(|e| {
            KoboError::InvalidUrl(e.to_string())
        })?;
        let url = endpoint(&base, &["api", "v2", "assets", "aXk3", "data", "42", ""])?;
        assert_eq!(
            url.as_str(),
            "https://kf.example.org/kpi/api/v2/assets/aXk3/data/42/"
        );
        Ok(())
    }
}

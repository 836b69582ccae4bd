// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

// Allow expect/unwrap in tests - they provide clear panic messages on failure
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Tests for the iNaturalist client against mock web and API servers.

use std::time::Duration;

use inaturalist_client::{Credentials, InaturalistClient, InaturalistError, NewObservation};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Servers {
    webapp: MockServer,
    api: MockServer,
}

/// Start a web app that grants `access-1` then JWT `jwt-1`, and an empty API
async fn mock_servers() -> Servers {
    let webapp = MockServer::start().await;
    let api = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=cid"))
        .and(body_string_contains("username=someone%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "Bearer",
        })))
        .mount(&webapp)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/api_token"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"api_token": "jwt-1"})))
        .mount(&webapp)
        .await;

    Servers { webapp, api }
}

async fn connect(servers: &Servers) -> Result<InaturalistClient, InaturalistError> {
    let password = SecretString::from("pw".to_string());
    let secret = SecretString::from("cs".to_string());
    InaturalistClient::connect(
        &format!("{}/v1", servers.api.uri()),
        &servers.webapp.uri(),
        &Credentials {
            username: "someone@example.com",
            password: &password,
            client_id: "cid",
            client_secret: &secret,
        },
        Duration::from_secs(5),
    )
    .await
}

#[tokio::test]
async fn test_connect_rejected_grant() {
    let webapp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&webapp)
        .await;
    let servers = Servers {
        webapp,
        api: MockServer::start().await,
    };

    assert!(matches!(
        connect(&servers).await,
        Err(InaturalistError::AuthRejected(_))
    ));
}

#[tokio::test]
async fn test_create_observation_returns_id() {
    let servers = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/v1/observations"))
        .and(header("authorization", "jwt-1"))
        .and(body_json(json!({
            "observation": {
                "taxon_id": 47126,
                "longitude": -1.5,
                "latitude": 52.25,
                "observed_on_string": "2024-05-01T10:00:00Z",
                "positional_accuracy": 8.0,
                "description": "under the big oak",
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9001})))
        .expect(1)
        .mount(&servers.api)
        .await;

    let client = connect(&servers).await.unwrap();
    let id = client
        .create_observation(&NewObservation {
            taxon_id: Some(47126),
            longitude: -1.5,
            latitude: 52.25,
            observed_on_string: "2024-05-01T10:00:00Z".to_string(),
            positional_accuracy: Some(8.0),
            description: Some("under the big oak".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(id, 9001);
}

#[tokio::test]
async fn test_attach_image_uploads_multipart() {
    let servers = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/v1/observation_photos"))
        .and(header("authorization", "jwt-1"))
        .and(body_string_contains("observation_id"))
        .and(body_string_contains("9001"))
        .and(body_string_contains("jpeg-bytes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&servers.api)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("uid_42_photo.jpg");
    std::fs::write(&image, b"jpeg-bytes").unwrap();

    let client = connect(&servers).await.unwrap();
    client.attach_image(9001, &image).await.unwrap();
}

#[tokio::test]
async fn test_attach_observation_field() {
    let servers = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/v1/observation_field_values"))
        .and(body_json(json!({
            "observation_field_value": {
                "observation_id": 9001,
                "observation_field_id": 12,
                "value": "wet meadow",
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5})))
        .expect(1)
        .mount(&servers.api)
        .await;

    let client = connect(&servers).await.unwrap();
    client
        .attach_observation_field(9001, 12, &json!("wet meadow"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_validation_error_surfaces_body() {
    let servers = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/v1/observations"))
        .respond_with(ResponseTemplate::new(422).set_body_string("latitude out of range"))
        .mount(&servers.api)
        .await;

    let client = connect(&servers).await.unwrap();
    let err = client
        .create_observation(&NewObservation::default())
        .await
        .unwrap_err();

    match err {
        InaturalistError::Status { status, body, .. } => {
            assert_eq!(status, 422);
            assert!(body.contains("latitude"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

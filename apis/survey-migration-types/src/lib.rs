// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Shared wire types for survey migration jobs.
//!
//! These are the JSON shapes exchanged with the outside world: job
//! descriptors written to the job bucket, the submissions API request and
//! response, and nothing else. Field names follow the wire format; the
//! Rust names describe what the fields hold.

use std::collections::BTreeMap;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of one submitted survey instance.
///
/// The survey backend numbers submissions, so the id shows up as a JSON
/// integer in some payloads and as a string in others. Both forms decode to
/// the same value; it always encodes as a string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for InstanceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

// ============================================================================
// Job Descriptors
// ============================================================================

/// One stored unit of migration intent, as written to the job bucket.
///
/// Descriptors are keyed `{email}{suffix}`; several may exist for one
/// identity and are merged into a single job by the loader.
#[derive(Debug, Deserialize)]
pub struct JobDescriptor {
    /// Survey backend username
    #[serde(rename = "kobo_username")]
    pub source_username: String,
    /// Survey backend password
    #[serde(rename = "kobo_password")]
    pub source_password: SecretString,
    /// Survey backend asset (form) uid the instances belong to
    #[serde(rename = "kobo_uid")]
    pub source_account_id: String,
    /// Observation platform login
    #[serde(rename = "inaturalist_email")]
    pub destination_identity: String,
    /// Observation platform password
    #[serde(rename = "inaturalist_password")]
    pub destination_password: SecretString,
    /// OAuth application id on the observation platform
    #[serde(rename = "client_id")]
    pub destination_client_id: String,
    /// OAuth application secret on the observation platform
    #[serde(rename = "client_secret")]
    pub destination_client_secret: SecretString,
    /// Instances this descriptor asks to migrate
    #[serde(rename = "instances")]
    pub instance_ids: Vec<InstanceId>,
}

// ============================================================================
// Submissions API
// ============================================================================

/// Body of `GET {api}/submissions`.
#[derive(Serialize)]
pub struct SubmissionsRequest<'a> {
    pub kobo_username: &'a str,
    #[serde(serialize_with = "expose")]
    pub kobo_password: &'a SecretString,
    pub kobo_uid: &'a str,
    pub email: &'a str,
}

fn expose<S: Serializer>(secret: &&SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl fmt::Debug for SubmissionsRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionsRequest")
            .field("kobo_username", &self.kobo_username)
            .field("kobo_password", &"[REDACTED]")
            .field("kobo_uid", &self.kobo_uid)
            .field("email", &self.email)
            .finish()
    }
}

/// What was observed, as recorded by the surveyor.
///
/// A numeric value is a taxon id on the observation platform; anything else
/// is a free-text name used as the species guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Taxon {
    Id(u64),
    Name(String),
}

/// One candidate record returned by the submissions API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    #[serde(rename = "instance")]
    pub instance_id: InstanceId,

    /// Attachment file names, in the order they were captured
    #[serde(default)]
    pub images: Vec<String>,

    pub taxa: Taxon,

    pub longitude: f64,

    pub latitude: f64,

    /// Observation time as reported by the survey form
    #[serde(rename = "ts")]
    pub timestamp: String,

    /// Radius of GPS uncertainty in meters
    #[serde(default)]
    pub positional_accuracy: Option<f64>,

    #[serde(default)]
    pub notes: Option<String>,

    /// Observation field values keyed by field id (a decimal string)
    #[serde(default)]
    pub observation_fields: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_instance_id_accepts_numbers_and_strings() {
        let ids: Vec<InstanceId> = serde_json::from_value(json!([12, "12", "uuid:abc"])).unwrap();
        assert_eq!(ids[0], ids[1]);
        assert_eq!(ids[2].as_str(), "uuid:abc");
        assert_eq!(serde_json::to_value(&ids[0]).unwrap(), json!("12"));
    }

    #[test]
    fn test_descriptor_parses_wire_names() {
        let descriptor: JobDescriptor = serde_json::from_value(json!({
            "kobo_username": "surveyor",
            "kobo_password": "hunter2",
            "kobo_uid": "aXk3",
            "inaturalist_email": "someone@example.com",
            "inaturalist_password": "pw",
            "client_id": "cid",
            "client_secret": "cs",
            "instances": ["A", 7],
        }))
        .unwrap();

        assert_eq!(descriptor.source_username, "surveyor");
        assert_eq!(descriptor.source_password.expose_secret(), "hunter2");
        assert_eq!(descriptor.source_account_id, "aXk3");
        assert_eq!(
            descriptor.instance_ids,
            vec![InstanceId::from("A"), InstanceId::from("7")]
        );
        assert!(!format!("{:?}", descriptor).contains("hunter2"));
    }

    #[test]
    fn test_descriptor_missing_field_is_rejected() {
        let result: Result<JobDescriptor, _> = serde_json::from_value(json!({
            "kobo_username": "surveyor",
            "kobo_uid": "aXk3",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_submission_record_defaults() {
        let record: SubmissionRecord = serde_json::from_value(json!({
            "instance": 42,
            "taxa": "Quercus robur",
            "longitude": -1.5,
            "latitude": 52.25,
            "ts": "2024-05-01T10:00:00Z",
        }))
        .unwrap();

        assert_eq!(record.instance_id.as_str(), "42");
        assert!(record.images.is_empty());
        assert_eq!(record.taxa, Taxon::Name("Quercus robur".to_string()));
        assert_eq!(record.positional_accuracy, None);
        assert!(record.observation_fields.is_empty());
    }

    #[test]
    fn test_taxon_id_is_numeric() {
        let taxon: Taxon = serde_json::from_value(json!(47126)).unwrap();
        assert_eq!(taxon, Taxon::Id(47126));
    }

    #[test]
    fn test_submissions_request_hides_password_in_debug() {
        let password = SecretString::from("s3cret".to_string());
        let request = SubmissionsRequest {
            kobo_username: "u",
            kobo_password: &password,
            kobo_uid: "uid",
            email: "e@example.com",
        };

        assert!(!format!("{:?}", request).contains("s3cret"));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "kobo_username": "u",
                "kobo_password": "s3cret",
                "kobo_uid": "uid",
                "email": "e@example.com",
            })
        );
    }
}

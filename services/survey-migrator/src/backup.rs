// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Backup layout
//!
//! ```text
//! {account_id}/{instance}.json           full submission payload
//! {account_id}/{instance}/{suffix}.jpg   one object per image
//! ```
//!
//! The image suffix keeps the reference's own extension, so a Kobo image
//! `1700000000123.jpg` lands at `{instance}/1700000000123.jpg.jpg`. Existing
//! backups use that layout.
//!
//! Record payloads are written as canonical JSON (sorted keys, four-space
//! indentation) so that backing up the same submission twice produces the
//! same bytes.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use survey_migration_types::InstanceId;

pub fn record_key(account_id: &str, instance: &InstanceId) -> String {
    format!("{}/{}.json", account_id, instance)
}

pub fn image_key(account_id: &str, instance: &InstanceId, suffix: &str) -> String {
    format!("{}/{}/{}.jpg", account_id, instance, suffix)
}

/// Serialize `value` with every object's keys in sorted order
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    Canonical(value).serialize(&mut serializer)?;
    Ok(out)
}

// `serde_json::Map` is only sorted while the `preserve_order` feature is off
// everywhere in the build, so ordering is enforced here.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Canonical(value))?;
                }
                out.end()
            }
            Value::Array(items) => serializer.collect_seq(items.iter().map(Canonical)),
            other => other.serialize(serializer),
        }
    }
}

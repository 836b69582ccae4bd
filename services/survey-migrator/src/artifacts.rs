// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Per-record scratch space
//!
//! Each record's images are downloaded into a private temporary directory
//! that is removed when the record finishes, whatever the outcome. The
//! directory is also removed if the record's future is dropped part way.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use survey_migration_types::InstanceId;
use tempfile::TempDir;

/// One image downloaded for a record
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    /// Image reference as listed on the submission
    pub image_ref: String,
    /// Local copy
    pub path: PathBuf,
    /// Name of the image within the record's backup folder
    pub suffix: String,
}

/// Scratch directory owned by one record
#[derive(Debug)]
pub struct RecordWorkspace {
    dir: TempDir,
    prefix: String,
}

impl RecordWorkspace {
    pub fn create(work_dir: &Path, account_id: &str, instance: &InstanceId) -> io::Result<Self> {
        let prefix = format!("{}_{}", sanitize(account_id), sanitize(instance.as_str()));
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", prefix))
            .tempdir_in(work_dir)?;
        Ok(Self { dir, prefix })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Local file for `image_ref`, named `{account}_{instance}_{image}`
    pub fn artifact_path(&self, image_ref: &str) -> PathBuf {
        self.dir
            .path()
            .join(format!("{}_{}", self.prefix, sanitize(image_ref)))
    }

    /// Remove the directory and report whether that worked
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// Backup names for a record's images, one per entry of `images`.
///
/// An image is normally named by the part of its reference after the last
/// `_`, extension included (`1700000000_leaf.jpg` becomes `leaf.jpg`, which
/// the backup layout stores as `leaf.jpg.jpg`). References that would share
/// a name use their whole sanitized reference instead, and a numeric suffix
/// settles anything still equal. The result never contains duplicates.
pub fn image_suffixes(images: &[String]) -> Vec<String> {
    let short: Vec<String> = images.iter().map(|image| short_suffix(image)).collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for suffix in &short {
        *counts.entry(suffix.as_str()).or_default() += 1;
    }

    let mut used = HashSet::new();
    images
        .iter()
        .zip(&short)
        .map(|(image, suffix)| {
            let preferred = if counts.get(suffix.as_str()).copied().unwrap_or(0) > 1 {
                long_suffix(image)
            } else {
                suffix.clone()
            };

            let mut candidate = preferred.clone();
            let mut n = 2;
            while !used.insert(candidate.clone()) {
                candidate = format!("{}-{}", preferred, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

fn short_suffix(image: &str) -> String {
    let tail = image.rsplit('_').next().unwrap_or(image);
    let suffix = sanitize(tail);
    if suffix.is_empty() {
        long_suffix(image)
    } else {
        suffix
    }
}

fn long_suffix(image: &str) -> String {
    let suffix = sanitize(image);
    if suffix.is_empty() {
        "image".to_string()
    } else {
        suffix
    }
}

/// Make `s` safe as a single path component or key segment
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    fn suffixes(images: &[&str]) -> Vec<String> {
        let images: Vec<String> = images.iter().map(|s| s.to_string()).collect();
        image_suffixes(&images)
    }

    #[test]
    fn test_suffix_after_last_underscore() {
        assert_eq!(
            suffixes(&["1700000000_leaf.jpg", "1700000001_bark.jpg"]),
            vec!["leaf.jpg", "bark.jpg"]
        );
    }

    #[test]
    fn test_suffix_without_underscore() {
        assert_eq!(suffixes(&["flower"]), vec!["flower"]);
        assert_eq!(suffixes(&["1700000000123.jpg"]), vec!["1700000000123.jpg"]);
    }

    #[test]
    fn test_colliding_suffixes_use_full_reference() {
        assert_eq!(
            suffixes(&["a_photo.jpg", "b_photo.jpg", "c_other.jpg"]),
            vec!["a_photo.jpg", "b_photo.jpg", "other.jpg"]
        );
    }

    #[test]
    fn test_identical_references_get_numbered() {
        assert_eq!(
            suffixes(&["x_photo.jpg", "x_photo.jpg"]),
            vec!["x_photo.jpg", "x_photo.jpg-2"]
        );
    }

    #[test]
    fn test_path_characters_are_replaced() {
        assert_eq!(suffixes(&["dir/one_two/three.jpg"]), vec!["two-three.jpg"]);
    }

    #[test]
    fn test_workspace_paths_and_cleanup() {
        let work = tempfile::tempdir().unwrap();
        let workspace =
            RecordWorkspace::create(work.path(), "aXk3", &InstanceId::from("42")).unwrap();

        let path = workspace.artifact_path("1700000000_leaf.jpg");
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "aXk3_42_1700000000_leaf.jpg"
        );
        assert!(path.starts_with(work.path()));

        std::fs::write(&path, b"jpeg").unwrap();
        let dir = workspace.path().to_path_buf();
        workspace.close().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let work = tempfile::tempdir().unwrap();
        let dir = {
            let workspace =
                RecordWorkspace::create(work.path(), "aXk3", &InstanceId::from("7")).unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!dir.exists());
    }
}

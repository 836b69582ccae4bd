// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Migrator configuration
//!
//! Built once at process start (from the command line in `main.rs`) and
//! passed by reference to every component.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default KoboToolbox server
pub const DEFAULT_KOBO_URL: &str = "https://kf.kobotoolbox.org";

/// Default limit for any single network call (seconds)
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;

/// Default number of records migrated at once
pub const DEFAULT_RECORD_CONCURRENCY: usize = 1;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Runtime settings for one migration run
#[derive(Clone, Debug)]
pub struct MigratorConfig {
    /// Bucket holding job descriptors
    pub job_bucket: String,
    /// Bucket receiving record and image backups
    pub backup_bucket: String,
    /// Base URL of the submissions API (`{url}/submissions`)
    pub submissions_api_url: String,
    /// KoboToolbox server
    pub kobo_url: String,
    /// iNaturalist API base URL
    pub inaturalist_api_url: String,
    /// iNaturalist web application URL (OAuth endpoints)
    pub inaturalist_webapp_url: String,
    /// Where per-record scratch directories are created
    pub work_dir: PathBuf,
    /// Records migrated concurrently within one job
    pub record_concurrency: usize,
    /// Limit applied to every network call
    pub call_timeout: Duration,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            job_bucket: String::new(),
            backup_bucket: String::new(),
            submissions_api_url: String::new(),
            kobo_url: DEFAULT_KOBO_URL.to_string(),
            inaturalist_api_url: String::new(),
            inaturalist_webapp_url: String::new(),
            work_dir: std::env::temp_dir(),
            record_concurrency: DEFAULT_RECORD_CONCURRENCY,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl MigratorConfig {
    /// Check the settings a run cannot start without
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("job bucket", &self.job_bucket),
            ("backup bucket", &self.backup_bucket),
            ("submissions API URL", &self.submissions_api_url),
            ("KoboToolbox URL", &self.kobo_url),
            ("iNaturalist API URL", &self.inaturalist_api_url),
            ("iNaturalist webapp URL", &self.inaturalist_webapp_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }

        if self.job_bucket == self.backup_bucket {
            return Err(ConfigError::Invalid {
                field: "backup bucket",
                reason: "must differ from the job bucket".to_string(),
            });
        }

        if self.record_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "record concurrency",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.call_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "call timeout",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

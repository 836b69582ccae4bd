// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Survey migrator
//!
//! Moves a user's pending survey submissions from KoboToolbox to
//! iNaturalist. Each submission is backed up to the backup bucket before it
//! is uploaded, and deleted from the survey backend only once both the
//! backup and the upload succeeded.
//!
//! The work for one user is described by job descriptors in the job bucket
//! (see [`jobs`]). [`migrator::Migrator`] runs a whole job;
//! [`pipeline::MigrationPipeline`] holds the per-record steps.

pub mod artifacts;
pub mod backup;
pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod migrator;
pub mod pipeline;
pub mod platform;
pub mod submissions;

pub use config::MigratorConfig;
pub use error::{JobError, RecordError, RecordStep};
pub use migrator::{JobOutcome, Migrator};
pub use pipeline::{DescriptorCleanup, JobReport, RecordReport, RecordStatus};

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Prometheus metrics for the survey migrator
//!
//! The migrator is a one-shot process, so nothing scrapes it. When asked,
//! `main` writes the gathered metrics to a textfile for a node exporter to
//! pick up.

use std::path::Path;

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

// Static metric initialization uses expect because these are constant
// definitions; a failure is a programming error that should panic at startup.
#[allow(clippy::expect_used)]
mod metrics_impl {
    use super::*;
    use lazy_static::lazy_static;

    lazy_static! {
        /// Registry for all migrator metrics
        pub static ref REGISTRY: Registry = Registry::new();

        /// Records processed by final status
        pub static ref RECORDS_TOTAL: CounterVec = CounterVec::new(
            Opts::new("survey_migrator_records_total", "Records processed by status"),
            &["status"]
        ).expect("valid metric name and labels");

        /// Record failures by the step they happened in
        pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
            Opts::new("survey_migrator_errors_total", "Record failures by step"),
            &["step"]
        ).expect("valid metric name and labels");

        /// Images written to the backup bucket
        pub static ref IMAGES_BACKED_UP: Counter = Counter::with_opts(
            Opts::new("survey_migrator_images_backed_up_total", "Images written to backup")
        ).expect("valid metric name");

        /// Job descriptors removed after a clean run
        pub static ref DESCRIPTORS_DELETED: Counter = Counter::with_opts(
            Opts::new(
                "survey_migrator_descriptors_deleted_total",
                "Job descriptors deleted after completion"
            )
        ).expect("valid metric name");

        /// Deletes and scratch removals that did not go through
        pub static ref CLEANUP_FAILURES: Counter = Counter::with_opts(
            Opts::new(
                "survey_migrator_cleanup_failures_total",
                "Total cleanup failures (source deletes, descriptor deletes, scratch dirs)"
            )
        ).expect("valid metric name");

        /// Job duration histogram
        pub static ref JOB_DURATION: Histogram = Histogram::with_opts(
            HistogramOpts::new(
                "survey_migrator_job_duration_seconds",
                "Job completion time in seconds"
            )
            // Buckets: 1s, 5s, 10s, 30s, 1m, 2m, 5m, 10m, 30m, 1h
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0])
        ).expect("valid histogram opts");
    }
}

pub use metrics_impl::{
    CLEANUP_FAILURES, DESCRIPTORS_DELETED, ERRORS_TOTAL, IMAGES_BACKED_UP, JOB_DURATION,
    RECORDS_TOTAL, REGISTRY,
};

/// Register all metrics with the registry
///
/// Should be called once during application startup.
/// Panics if registration fails (indicates a programming error).
#[allow(clippy::expect_used)]
pub fn register_metrics() {
    REGISTRY
        .register(Box::new(RECORDS_TOTAL.clone()))
        .expect("Failed to register RECORDS_TOTAL");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("Failed to register ERRORS_TOTAL");
    REGISTRY
        .register(Box::new(IMAGES_BACKED_UP.clone()))
        .expect("Failed to register IMAGES_BACKED_UP");
    REGISTRY
        .register(Box::new(DESCRIPTORS_DELETED.clone()))
        .expect("Failed to register DESCRIPTORS_DELETED");
    REGISTRY
        .register(Box::new(CLEANUP_FAILURES.clone()))
        .expect("Failed to register CLEANUP_FAILURES");
    REGISTRY
        .register(Box::new(JOB_DURATION.clone()))
        .expect("Failed to register JOB_DURATION");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

/// Write gathered metrics to `path` in the textfile collector format
pub async fn write_textfile(path: &Path) -> std::io::Result<()> {
    tokio::fs::write(path, gather_metrics()).await
}

/// Record a record reaching its final status
pub fn record_status(status: &str) {
    RECORDS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a record failing in `step`
pub fn record_failure(step: &str) {
    RECORDS_TOTAL.with_label_values(&["failed"]).inc();
    ERRORS_TOTAL.with_label_values(&[step]).inc();
}

pub fn record_image_backed_up() {
    IMAGES_BACKED_UP.inc();
}

pub fn record_descriptor_deleted() {
    DESCRIPTORS_DELETED.inc();
}

/// Record a cleanup failure
///
/// The record or job itself already reached its outcome; only the tidy-up
/// was degraded.
pub fn record_cleanup_failure() {
    CLEANUP_FAILURES.inc();
}

/// Record a job's duration
pub fn record_job_duration(duration_secs: f64) {
    JOB_DURATION.observe(duration_secs);
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Survey migrator
//!
//! Runs the migration job stored for one email address and prints a summary.
//! Record failures are reported but do not change the exit status; only
//! errors that stop the whole job do. An identity with no job exits quietly.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use blob_store::{BlobStore, FsBlobStore, S3BlobStore};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use survey_migrator::config::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_KOBO_URL, DEFAULT_RECORD_CONCURRENCY, MigratorConfig,
};
use survey_migrator::platform::HttpConnector;
use survey_migrator::submissions::SubmissionFetcher;
use survey_migrator::{DescriptorCleanup, JobOutcome, JobReport, Migrator, RecordStatus, metrics};

#[derive(Parser)]
#[command(name = "survey-migrator")]
#[command(about = "Migrate pending survey submissions to iNaturalist", long_about = None)]
#[command(version)]
struct Cli {
    /// Email address whose job should be run
    #[arg(short, long, env = "MIGRATE_EMAIL")]
    email: String,

    /// Bucket holding job descriptors
    #[arg(short, long, env = "JOB_BUCKET")]
    bucket: String,

    /// Bucket receiving backups
    #[arg(long, env = "BACKUP_BUCKET")]
    backup_bucket: String,

    /// Keep buckets as directories under this root instead of in S3
    #[arg(long, env = "STORE_ROOT", conflicts_with = "s3_endpoint")]
    store_root: Option<PathBuf>,

    /// S3-compatible endpoint to use instead of AWS
    #[arg(long, env = "S3_ENDPOINT_URL")]
    s3_endpoint: Option<String>,

    /// Base URL of the submissions API
    #[arg(long, env = "API_URL")]
    api_url: String,

    /// KoboToolbox server
    #[arg(long, env = "KOBO_URL", default_value = DEFAULT_KOBO_URL)]
    kobo_url: String,

    /// iNaturalist API base URL
    #[arg(long, env = "INATURALIST_API")]
    inat_api: String,

    /// iNaturalist web application URL
    #[arg(long, env = "INATURALIST_WEBAPP")]
    inat_webapp: String,

    /// Directory for per-record scratch space (default: system temp dir)
    #[arg(long, env = "WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Records migrated concurrently
    #[arg(long, env = "RECORD_CONCURRENCY", default_value_t = DEFAULT_RECORD_CONCURRENCY)]
    record_concurrency: usize,

    /// Limit for each network call, in seconds
    #[arg(long, env = "CALL_TIMEOUT_SECS", default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    call_timeout_secs: u64,

    /// Write Prometheus metrics to this file on exit
    #[arg(long, env = "METRICS_FILE")]
    metrics_file: Option<PathBuf>,

    /// Print the job report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn config(&self) -> MigratorConfig {
        MigratorConfig {
            job_bucket: self.bucket.clone(),
            backup_bucket: self.backup_bucket.clone(),
            submissions_api_url: self.api_url.clone(),
            kobo_url: self.kobo_url.clone(),
            inaturalist_api_url: self.inat_api.clone(),
            inaturalist_webapp_url: self.inat_webapp.clone(),
            work_dir: self.work_dir.clone().unwrap_or_else(std::env::temp_dir),
            record_concurrency: self.record_concurrency,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "survey_migrator=info".to_string()),
        ))
        .with_writer(std::io::stderr)
        .init();

    metrics::register_metrics();

    let config = cli.config();
    config.validate().context("Invalid configuration")?;

    let store: Box<dyn BlobStore> = match &cli.store_root {
        Some(root) => {
            info!(root = %root.display(), "Using local object store");
            Box::new(FsBlobStore::new(root))
        }
        None => Box::new(S3BlobStore::from_env(cli.s3_endpoint.as_deref()).await),
    };
    let fetcher = SubmissionFetcher::new(&config.submissions_api_url, config.call_timeout)?;
    let connector = HttpConnector::new(&config);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let outcome = Migrator::new(&config, store.as_ref(), &fetcher, &connector)
        .run(&cli.email, &cancel)
        .await;

    if let Some(path) = &cli.metrics_file
        && let Err(e) = metrics::write_textfile(path).await
    {
        warn!(path = %path.display(), error = %e, "Failed to write metrics file");
    }

    match outcome.with_context(|| format!("Migration for {} failed", cli.email))? {
        JobOutcome::Absent => {}
        JobOutcome::Completed(report) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }

    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }

    info!("Shutdown requested; finishing records in progress");
    token.cancel();
}

fn print_report(report: &JobReport) {
    println!("Migration for {}", report.identity);
    println!("{}", "=".repeat(72));

    if report.records.is_empty() {
        println!("No pending submissions.");
    } else {
        println!(
            "{:<16} {:<26} {:<12} DETAIL",
            "INSTANCE", "STATUS", "OBSERVATION"
        );
        println!("{}", "-".repeat(72));
        for record in &report.records {
            let observation = record
                .status
                .observation_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            let detail = match &record.status {
                RecordStatus::Migrated { .. } => String::new(),
                RecordStatus::MigratedSourceRetained { error, .. } => error.clone(),
                RecordStatus::Failed { step, error, .. } => format!("{}: {}", step, error),
                RecordStatus::Abandoned { before } => format!("cancelled before {}", before),
            };
            println!(
                "{:<16} {:<26} {:<12} {}",
                record.instance.as_str(),
                record.status.label(),
                observation,
                detail
            );
        }
    }

    println!();
    println!(
        "Migrated: {}  Failed: {}  Abandoned: {}",
        report.migrated(),
        report.failed(),
        report.abandoned()
    );
    match &report.descriptors {
        DescriptorCleanup::Deleted { keys } => {
            println!("Job descriptors: {} deleted", keys.len());
        }
        DescriptorCleanup::Retained { reason } => {
            println!("Job descriptors: kept ({})", reason);
        }
        DescriptorCleanup::Partial { deleted, failed } => {
            println!(
                "Job descriptors: {} deleted, {} could not be deleted",
                deleted.len(),
                failed.len()
            );
            for failure in failed {
                println!("  {}", failure);
            }
        }
    }
}

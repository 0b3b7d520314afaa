//! Catalog Mirror Binary
//!
//! Runs one reconciliation or export pass and exits. Scheduling is left to
//! the invoker (cron, a timer-triggered function host, a Kubernetes CronJob).
//!
//! ## Configuration
//!
//! Environment variables (a `.env` file in the working directory is loaded
//! first if present):
//! - `API_STREAM`: upstream catalog streaming endpoint (catalog-sync)
//! - `AZURE_CONNECTION_STRING`, or `AZURE_STORAGE_ACCOUNT_NAME` and
//!   `AZURE_STORAGE_ACCOUNT_KEY`: blob storage credentials
//! - `AZURE_CONTAINER_NAME`: target container
//! - `DATABASE_URL`, or `DB_HOST`/`DB_NAME`/`DB_USER`/`DB_PASSWORD` (feedback-export)
//! - `RUN_TIMEOUT_SECS`: optional limit on the whole run
//! - `RUST_LOG`: log level filter (default: catalog_mirror=info,sqlx=warn)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin catalog_mirror --features service -- catalog-sync
//! cargo run --bin catalog_mirror --features service -- feedback-export
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use catalog_mirror::config::{ExportConfig, SyncConfig};
use catalog_mirror::source::PostgresCorrectionSource;
use catalog_mirror::store::AzureBlobStore;
use catalog_mirror::sync::SyncOptions;
use catalog_mirror::{CatalogSync, FeedbackExport, HttpCatalogSource};

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser)]
#[command(name = "catalog_mirror")]
#[command(version)]
#[command(about = "Mirror a streamed catalog into blob storage and export reviewed replies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the upstream catalog into the container
    CatalogSync,

    /// Export recent reviewed replies as numbered examples
    FeedbackExport,
}

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "catalog_mirror=info,sqlx=warn".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init();
    }
}

/// Await `run`, giving up after `limit` if one is set.
///
/// Stopping early leaves a completed prefix of creates and deletes; the next
/// run finishes the rest.
async fn with_deadline<T, E, F>(limit: Option<Duration>, run: F) -> Result<T, BoxError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    let Some(limit) = limit else {
        return run.await.map_err(Into::into);
    };
    match tokio::time::timeout(limit, run).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::error!(timeout_secs = limit.as_secs(), "Run timed out");
            Err(format!("run exceeded {}s", limit.as_secs()).into())
        }
    }
}

async fn catalog_sync() -> Result<(), BoxError> {
    let config = SyncConfig::from_env()?;
    info!(
        endpoint = %config.catalog_url,
        container = %config.azure.container,
        concurrency = config.concurrency,
        "Catalog sync configured"
    );

    let store = Arc::new(AzureBlobStore::new(&config.azure)?);
    let catalog = HttpCatalogSource::new(config.catalog_url.clone(), config.catalog_timeout);
    let sync = CatalogSync::with_options(catalog, store, SyncOptions::from(&config));

    let summary = with_deadline(config.run_timeout, sync.run()).await?;
    if !summary.is_clean() {
        warn!(
            create_failed = summary.write.failed(),
            delete_failed = summary.prune.failed(),
            "Catalog sync finished with failures; the next run retries them"
        );
    }
    Ok(())
}

async fn feedback_export() -> Result<(), BoxError> {
    let config = ExportConfig::from_env()?;
    info!(
        container = %config.azure.container,
        lookback_weeks = config.lookback_weeks,
        difference_threshold = config.difference_threshold,
        order_by = %config.order_by,
        "Feedback export configured"
    );

    let store = Arc::new(AzureBlobStore::new(&config.azure)?);

    // Connect to PostgreSQL with timeout
    info!("Connecting to PostgreSQL...");
    let connect_start = Instant::now();
    let connect_limit = Duration::from_secs(config.database.connect_timeout_secs.max(1) * 3);

    let source = match tokio::time::timeout(
        connect_limit,
        PostgresCorrectionSource::new(&config.database),
    )
    .await
    {
        Ok(Ok(source)) => source,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            tracing::error!(timeout_secs = connect_limit.as_secs(), "PostgreSQL connection timeout");
            return Err("Database connection timeout".into());
        }
    };

    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );

    let export = FeedbackExport::with_pattern(source, store, config.pattern());
    let query = config.query(chrono::Utc::now());

    let summary = with_deadline(config.run_timeout, export.run(&query)).await?;
    if summary.failed() > 0 {
        warn!(failed = summary.failed(), "Feedback export finished with failures");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");
    info!(version = version, build_sha = build_sha, "Starting catalog mirror");

    let result = match cli.command {
        Commands::CatalogSync => catalog_sync().await,
        Commands::FeedbackExport => feedback_export().await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Run aborted");
    }
    result
}

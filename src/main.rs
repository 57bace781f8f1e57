//! Uplift: uploads local files through the reconciliation engine.
//!
//! Runs against the loopback bridge, which simulates the transfer
//! in-process, and prints the final queue state as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use uplift_bridge::MemoryBridge;
use uplift_core::config::AppConfig;
use uplift_core::error::AppError;
use uplift_core::tier::UploadTier;
use uplift_engine::{EngineOptions, EngineSnapshot, ReconciliationEngine, UploadManager};

/// Upload files to S3 with tier-aware queue processing
#[derive(Debug, Parser)]
#[command(name = "uplift", version, about, long_about = None)]
struct Cli {
    /// Upload tier (free or premium)
    #[arg(short, long)]
    tier: Option<UploadTier>,

    /// Target S3 bucket
    #[arg(short, long)]
    bucket: Option<String>,

    /// Key prefix for uploaded objects
    #[arg(short, long)]
    prefix: Option<String>,

    /// Insert a YYYY/MM/DD folder into object keys
    #[arg(long)]
    date_folder: bool,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(cli, config).await {
        tracing::error!(error = %e, "Upload failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration(path: Option<&str>) -> Result<AppConfig, AppError> {
    let config_path = path
        .map(str::to_string)
        .or_else(|| std::env::var("UPLIFT_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let env = std::env::var("UPLIFT_ENV").unwrap_or_else(|_| "development".to_string());

    let mut config = AppConfig::load(&config_path)
        .map_err(|e| AppError::configuration(format!("Config load error: {}", e)))?;

    let env_config_path = format!("config/{}.toml", env);
    if std::path::Path::new(&env_config_path).exists() {
        let env_config = AppConfig::load(&env_config_path)
            .map_err(|e| AppError::configuration(format!("Env config load error: {}", e)))?;
        config.merge(env_config);
    }

    Ok(config)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn run(cli: Cli, mut config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Uplift v{}", env!("CARGO_PKG_VERSION"));

    if let Some(tier) = cli.tier {
        config.upload.default_tier = tier;
    }
    if let Some(bucket) = cli.bucket {
        config.upload.bucket = bucket;
    }
    if let Some(prefix) = cli.prefix {
        config.upload.key_prefix = prefix;
    }
    if cli.date_folder {
        config.upload.use_date_folder = true;
    }

    let bridge = Arc::new(MemoryBridge::from_config(&config.upload).with_picker_candidates(cli.files));
    let engine = ReconciliationEngine::new(bridge, EngineOptions::from_config(&config.upload));
    engine
        .on_complete(|items| {
            tracing::info!(completed = items.len(), "All uploads finished");
        })
        .await;

    let manager = UploadManager::new(engine, &config.upload, config.credentials.clone());
    manager.connect().await?;

    let selection = manager.pick_files(true, None).await?;
    if selection.is_empty() {
        return Err(AppError::not_found("None of the given files exist"));
    }
    tracing::info!(
        tier = %manager.tier(),
        count = selection.count,
        total_size = selection.total_size,
        "Files selected"
    );

    let mut changes = manager.engine().subscribe_changes();
    manager.start().await?;

    let snapshot = loop {
        let snapshot = manager.snapshot().await;
        if !snapshot.is_uploading {
            break snapshot;
        }
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break manager.snapshot().await;
                }
                report_progress(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, stopping uploads");
                if let Err(e) = manager.stop().await {
                    tracing::warn!(error = %e, "Backend did not acknowledge stop");
                }
                break manager.snapshot().await;
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    manager.engine().shutdown();

    if snapshot.stats.failed_count > 0 {
        return Err(AppError::processing(format!(
            "{} of {} uploads failed",
            snapshot.stats.failed_count, snapshot.stats.total_count
        )));
    }
    Ok(())
}

fn report_progress(snapshot: &EngineSnapshot) {
    tracing::debug!(
        progress = snapshot.stats.rounded_progress(),
        completed = snapshot.stats.completed_count,
        total = snapshot.stats.total_count,
        speed_mbps = snapshot.stats.active_speed_mbps,
        "Upload progress"
    );
}

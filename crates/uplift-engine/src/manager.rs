//! Upload manager: the user-facing intents over the engine.
//!
//! Holds the resolved [`UploadConfig`] and checks every intent against
//! the current credentials and tier limits before the backend is
//! contacted.

use uplift_core::config::upload::UploadRuntimeConfig;
use uplift_core::error::AppError;
use uplift_core::result::AppResult;
use uplift_core::tier::{TierLimits, UploadConfig, UploadSettings, UploadTier, resolve};
use uplift_core::types::{AwsCredentials, FileSelection};

use crate::engine::{EngineSnapshot, ReconciliationEngine};

/// Drives a [`ReconciliationEngine`] on behalf of a user.
#[derive(Debug)]
pub struct UploadManager {
    engine: ReconciliationEngine,
    credentials: AwsCredentials,
    bucket: String,
    config: UploadConfig,
    free_max_selection_bytes: u64,
    premium_max_selection_bytes: Option<u64>,
}

impl UploadManager {
    /// Create a manager for the configured default tier.
    pub fn new(
        engine: ReconciliationEngine,
        runtime: &UploadRuntimeConfig,
        credentials: AwsCredentials,
    ) -> Self {
        let config = resolve(credentials.clone(), runtime.bucket.clone(), runtime.default_tier);
        Self {
            engine,
            credentials,
            bucket: runtime.bucket.clone(),
            config,
            free_max_selection_bytes: runtime.free_max_selection_bytes,
            premium_max_selection_bytes: runtime.premium_max_selection_bytes,
        }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Current tier.
    pub fn tier(&self) -> UploadTier {
        self.config.tier
    }

    /// Limits of the current tier.
    pub fn limits(&self) -> TierLimits {
        TierLimits::for_tier(
            self.config.tier,
            self.free_max_selection_bytes,
            self.premium_max_selection_bytes,
        )
    }

    /// Current engine state.
    pub async fn snapshot(&self) -> EngineSnapshot {
        self.engine.snapshot().await
    }

    /// Open the first session with the current configuration.
    pub async fn connect(&self) -> AppResult<()> {
        self.check_credentials(&self.credentials, &self.bucket).await?;
        self.engine.open_session(&self.config).await
    }

    /// Ask the picker for files and stage them if they fit the tier.
    pub async fn pick_files(&self, multiple: bool, filter: Option<&str>) -> AppResult<FileSelection> {
        let selection = match self.engine.bridge().open_file_picker(multiple, filter).await {
            Ok(selection) => selection,
            Err(e) => {
                tracing::error!(error = %e, "File picker failed");
                self.engine.report_error(&e).await;
                return Err(e);
            }
        };

        if let Err(e) = self.limits().check_selection(selection.total_size) {
            tracing::warn!(
                tier = %self.config.tier,
                total_size = selection.total_size,
                "Selection rejected by tier limits"
            );
            self.engine.report_error(&e).await;
            return Err(e);
        }

        if selection.is_empty() {
            tracing::debug!("File picker returned no files");
        }
        self.engine.stage_files(selection.clone()).await;
        Ok(selection)
    }

    /// Submit the staged files and start uploading.
    pub async fn start(&self) -> AppResult<()> {
        self.check_credentials(&self.credentials, &self.bucket).await?;
        self.engine.start().await
    }

    /// Stop uploading.
    pub async fn stop(&self) -> AppResult<()> {
        self.engine.stop().await
    }

    /// Retry one failed item.
    pub async fn retry(&self, id: &str) -> AppResult<()> {
        self.engine.retry(id).await
    }

    /// Remove one item.
    pub async fn remove(&self, id: &str) -> AppResult<()> {
        self.engine.remove(id).await
    }

    /// Clear the queue.
    pub async fn clear(&self) -> AppResult<()> {
        self.engine.clear().await
    }

    /// Dismiss the current error message.
    pub async fn dismiss_error(&self) {
        self.engine.dismiss_error().await;
    }

    /// Switch tier. The whole configuration is re-resolved and a fresh
    /// session is opened; nothing from the previous tier carries over.
    pub async fn change_tier(&mut self, tier: UploadTier) -> AppResult<()> {
        let config = resolve(self.credentials.clone(), self.bucket.clone(), tier);
        self.replace_config(config).await?;
        tracing::info!(%tier, "Upload tier changed");
        Ok(())
    }

    /// Apply Premium tunables to the current configuration.
    pub async fn apply_settings(&mut self, settings: &UploadSettings) -> AppResult<()> {
        let config = match self.config.with_settings(settings) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(tier = %self.config.tier, error = %e, "Upload settings rejected");
                self.engine.report_error(&e).await;
                return Err(e);
            }
        };
        self.replace_config(config).await?;
        tracing::info!(
            max_concurrent_uploads = settings.max_concurrent_uploads,
            chunk_size_mb = settings.chunk_size_mb,
            "Upload settings applied"
        );
        Ok(())
    }

    /// Replace credentials and bucket, keeping the current tier.
    pub async fn change_credentials(
        &mut self,
        credentials: AwsCredentials,
        bucket: impl Into<String>,
    ) -> AppResult<()> {
        let bucket = bucket.into();
        self.check_credentials(&credentials, &bucket).await?;
        let config = resolve(credentials.clone(), bucket.clone(), self.config.tier);
        self.replace_config(config).await?;
        self.credentials = credentials;
        self.bucket = bucket;
        tracing::info!(bucket = %self.bucket, "Upload credentials changed");
        Ok(())
    }

    async fn replace_config(&mut self, config: UploadConfig) -> AppResult<()> {
        if self.engine.is_uploading().await {
            let err = AppError::conflict("Stop the current upload before changing its configuration");
            self.engine.report_error(&err).await;
            return Err(err);
        }
        self.check_credentials(&config.aws_credentials, &config.bucket_name)
            .await?;
        self.engine.open_session(&config).await?;
        self.config = config;
        Ok(())
    }

    async fn check_credentials(&self, credentials: &AwsCredentials, bucket: &str) -> AppResult<()> {
        let checked = credentials.validate().and_then(|()| {
            if bucket.trim().is_empty() {
                Err(AppError::configuration("S3 bucket name is not set"))
            } else {
                Ok(())
            }
        });
        if let Err(e) = &checked {
            tracing::warn!(error = %e, "Upload configuration incomplete");
            self.engine.report_error(e).await;
        }
        checked
    }
}

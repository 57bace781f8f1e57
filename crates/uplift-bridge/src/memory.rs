//! Loopback command bridge backed by an in-process queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use uplift_core::config::upload::UploadRuntimeConfig;
use uplift_core::error::AppError;
use uplift_core::result::AppResult;
use uplift_core::tier::UploadConfig;
use uplift_core::traits::bridge::{CommandBridge, ProgressSubscription};
use uplift_core::types::{FileSelection, ProgressEvent, QueueStatistics, S3KeyConfig, UploadItem};

use crate::driver::TransferDriver;
use crate::picker::CandidatePicker;
use crate::pubsub::ProgressPubSub;
use crate::queue::BackendQueue;

/// Command bridge whose backend lives in the same process.
///
/// Transfers are simulated by a [`TransferDriver`]; everything else
/// mirrors the behaviour of the real queue commands.
#[derive(Debug)]
pub struct MemoryBridge {
    /// Authoritative queue state.
    queue: Arc<Mutex<BackendQueue>>,
    /// Progress fan-out.
    pubsub: Arc<ProgressPubSub>,
    /// Candidate files offered by the picker.
    picker: Mutex<CandidatePicker>,
    /// Driver tick length.
    tick: Duration,
    /// Cancellation handle of the running driver, if any.
    driver: Mutex<Option<CancellationToken>>,
}

impl MemoryBridge {
    /// Create a bridge with the given event buffer and driver tick.
    pub fn new(event_buffer: usize, tick: Duration) -> Self {
        Self {
            queue: Arc::new(Mutex::new(BackendQueue::new())),
            pubsub: Arc::new(ProgressPubSub::new(event_buffer)),
            picker: Mutex::new(CandidatePicker::default()),
            tick,
            driver: Mutex::new(None),
        }
    }

    /// Create a bridge from the runtime upload configuration.
    pub fn from_config(config: &UploadRuntimeConfig) -> Self {
        Self::new(config.event_buffer, Duration::from_millis(config.simulated_tick_ms))
    }

    /// Seed the files the picker offers.
    pub fn with_picker_candidates(self, candidates: Vec<PathBuf>) -> Self {
        Self {
            picker: Mutex::new(CandidatePicker::new(candidates)),
            ..self
        }
    }

    /// Make the first attempt of `file_name` fail halfway through.
    pub async fn fail_first_attempt(&self, file_name: impl Into<String>) {
        self.queue.lock().await.fail_first_attempt.insert(file_name.into());
    }

    /// Number of live progress listeners.
    pub fn listener_count(&self) -> usize {
        self.pubsub.listener_count()
    }

    /// Push an event to listeners without touching the queue.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        self.pubsub.publish(event)
    }

    async fn cancel_driver(&self) {
        if let Some(token) = self.driver.lock().await.take() {
            token.cancel();
        }
    }
}

#[async_trait]
impl CommandBridge for MemoryBridge {
    async fn initialize_queue(&self, config: &UploadConfig) -> AppResult<()> {
        tracing::info!(
            tier = %config.tier,
            bucket = %config.bucket_name,
            max_concurrent_uploads = config.max_concurrent_uploads,
            max_concurrent_parts = config.max_concurrent_parts,
            chunk_size_mb = config.chunk_size_mb,
            adaptive_chunk_size = config.adaptive_chunk_size,
            "Initializing upload queue"
        );
        config.validate_free_tier_limits()?;
        self.cancel_driver().await;
        self.queue.lock().await.initialize(config.clone());
        Ok(())
    }

    async fn add_files_to_queue(
        &self,
        paths: &[String],
        key_config: &S3KeyConfig,
    ) -> AppResult<()> {
        let added = self.queue.lock().await.add_files(paths, key_config)?;
        tracing::info!(count = added.len(), files = ?added, "Added files to upload queue");
        Ok(())
    }

    async fn start_processing(&self) -> AppResult<()> {
        {
            let mut queue = self.queue.lock().await;
            if queue.config.is_none() {
                return Err(AppError::configuration("Upload queue not initialized"));
            }
            if queue.is_processing {
                tracing::debug!("Upload processing is already running");
                return Ok(());
            }
            queue.is_processing = true;
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.driver.lock().await.replace(token.clone()) {
            previous.cancel();
        }
        let driver = TransferDriver::new(Arc::clone(&self.queue), Arc::clone(&self.pubsub), self.tick);
        tokio::spawn(driver.run(token));

        tracing::info!("Upload processing started");
        Ok(())
    }

    async fn stop_processing(&self) -> AppResult<()> {
        self.queue.lock().await.stop();
        self.cancel_driver().await;
        tracing::info!("Upload processing stopped");
        Ok(())
    }

    async fn retry_item(&self, id: &str) -> AppResult<()> {
        self.queue.lock().await.retry(id)?;
        tracing::info!(item_id = %id, "Retry scheduled for upload item");
        Ok(())
    }

    async fn remove_item(&self, id: &str) -> AppResult<()> {
        self.queue.lock().await.remove(id)?;
        tracing::info!(item_id = %id, "Removed item from upload queue");
        Ok(())
    }

    async fn clear_queue(&self) -> AppResult<()> {
        self.queue.lock().await.clear();
        self.cancel_driver().await;
        tracing::info!("Upload queue cleared");
        Ok(())
    }

    async fn get_queue_items(&self) -> AppResult<Vec<UploadItem>> {
        Ok(self.queue.lock().await.items.clone())
    }

    async fn get_queue_status(&self) -> AppResult<QueueStatistics> {
        Ok(self.queue.lock().await.statistics())
    }

    async fn open_file_picker(
        &self,
        multiple: bool,
        filter: Option<&str>,
    ) -> AppResult<FileSelection> {
        Ok(self.picker.lock().await.pick(multiple, filter))
    }

    async fn on_progress(&self) -> AppResult<ProgressSubscription> {
        Ok(self.pubsub.subscribe())
    }
}

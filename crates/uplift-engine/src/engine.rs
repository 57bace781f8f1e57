//! Reconciliation engine: keeps a local [`QueueState`] in step with the
//! backend queue through push events and periodic polls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use uplift_core::config::upload::UploadRuntimeConfig;
use uplift_core::error::AppError;
use uplift_core::result::AppResult;
use uplift_core::tier::UploadConfig;
use uplift_core::traits::bridge::{CommandBridge, ProgressSubscription};
use uplift_core::types::{
    AggregateStats, FileSelection, QueueStatistics, S3KeyConfig, UploadItem, UploadStatus,
};

use crate::state::{ApplyOutcome, IgnoreReason, PollSnapshot, QueuePhase, QueueState, UpdateSource};

/// Callback invoked with the `Completed` items when a queue finishes.
pub type CompletionHandler = Arc<dyn Fn(Vec<UploadItem>) + Send + Sync>;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Interval between snapshot polls while idle.
    pub poll_interval: Duration,
    /// Key generation settings sent with every submission.
    pub key_config: S3KeyConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            key_config: S3KeyConfig::default(),
        }
    }
}

impl EngineOptions {
    /// Build options from the runtime upload configuration.
    pub fn from_config(config: &UploadRuntimeConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            key_config: config.key_config(),
        }
    }
}

/// Point-in-time copy of the engine state for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub items: Vec<UploadItem>,
    pub stats: AggregateStats,
    pub backend_stats: Option<QueueStatistics>,
    pub phase: QueuePhase,
    pub is_uploading: bool,
    pub staged: Option<FileSelection>,
    pub last_error: Option<String>,
}

struct Shared {
    bridge: Arc<dyn CommandBridge>,
    options: EngineOptions,
    state: Mutex<QueueState>,
    on_complete: RwLock<Option<CompletionHandler>>,
    /// Mirrors `phase == Uploading` for the poll loop.
    uploading: watch::Sender<bool>,
    /// Bumped after every state change.
    revision: watch::Sender<u64>,
    /// Cancels every background task of the engine.
    shutdown: CancellationToken,
    /// Cancels the progress listener of the current session.
    listener: Mutex<Option<CancellationToken>>,
    poller_started: AtomicBool,
}

/// Owns the local queue state and the background tasks feeding it.
///
/// Dropping the engine cancels the progress listener and the poll loop.
pub struct ReconciliationEngine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("bridge", &self.shared.bridge)
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    /// Create an engine over `bridge`. No task runs until
    /// [`open_session`](Self::open_session) is called.
    pub fn new(bridge: Arc<dyn CommandBridge>, options: EngineOptions) -> Self {
        let (uploading, _) = watch::channel(false);
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                bridge,
                options,
                state: Mutex::new(QueueState::new()),
                on_complete: RwLock::new(None),
                uploading,
                revision,
                shutdown: CancellationToken::new(),
                listener: Mutex::new(None),
                poller_started: AtomicBool::new(false),
            }),
        }
    }

    /// The bridge this engine talks to.
    pub fn bridge(&self) -> &Arc<dyn CommandBridge> {
        &self.shared.bridge
    }

    /// Key generation settings used on submission.
    pub fn key_config(&self) -> &S3KeyConfig {
        &self.shared.options.key_config
    }

    /// Register the completion callback, replacing any previous one.
    pub async fn on_complete<F>(&self, handler: F)
    where
        F: Fn(Vec<UploadItem>) + Send + Sync + 'static,
    {
        *self.shared.on_complete.write().await = Some(Arc::new(handler));
    }

    /// Start a fresh session for `config`.
    ///
    /// Subscribes to progress events and reinitialises the backend queue,
    /// then replaces the progress listener and the local state. If either
    /// backend call fails the previous session stays in place.
    pub async fn open_session(&self, config: &UploadConfig) -> AppResult<()> {
        let subscription = match self.shared.bridge.on_progress().await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::error!(error = %e, "Failed to subscribe to upload progress");
                self.shared.record_error(&e).await;
                return Err(e);
            }
        };

        if let Err(e) = self.shared.bridge.initialize_queue(config).await {
            tracing::error!(tier = %config.tier, error = %e, "Failed to initialize upload queue");
            subscription.unsubscribe();
            self.shared.record_error(&e).await;
            return Err(e);
        }

        if let Some(previous) = self.shared.listener.lock().await.take() {
            previous.cancel();
            tracing::debug!("Progress listener torn down");
        }

        self.shared.state.lock().await.clear();
        self.shared.uploading.send_replace(false);

        let token = self.shared.shutdown.child_token();
        *self.shared.listener.lock().await = Some(token.clone());
        tokio::spawn(listen(Arc::clone(&self.shared), subscription, token));

        if !self.shared.poller_started.swap(true, Ordering::SeqCst) {
            let uploading = self.shared.uploading.subscribe();
            tokio::spawn(poll_loop(Arc::clone(&self.shared), uploading));
        }

        tracing::info!(
            tier = %config.tier,
            bucket = %config.bucket_name,
            "Upload session opened"
        );
        self.shared.bump();
        Ok(())
    }

    /// Stage a picker selection for the next start.
    pub async fn stage_files(&self, selection: FileSelection) {
        tracing::debug!(count = selection.count, total_size = selection.total_size, "Files staged");
        self.shared.state.lock().await.stage(selection);
        self.shared.bump();
    }

    /// Submit staged files and start processing.
    ///
    /// A [`stop`](Self::stop) that lands during submission cancels the
    /// start: submitted items stay queued and a conflict error is returned.
    pub async fn start(&self) -> AppResult<()> {
        let staged = {
            let state = self.shared.state.lock().await;
            if state.phase() != QueuePhase::Idle {
                return Err(AppError::conflict("An upload is already in progress"));
            }
            state.staged().cloned()
        };

        // Without a selection, resume whatever the backend holds.
        if staged.is_none() {
            if let Err(e) = self.shared.poll_once(false).await {
                tracing::warn!(error = %e, "Failed to refresh queue before start");
            }
        }

        {
            let mut state = self.shared.state.lock().await;
            if state.phase() != QueuePhase::Idle {
                return Err(AppError::conflict("An upload is already in progress"));
            }
            let resumable = state.items().iter().any(|i| {
                matches!(i.status, UploadStatus::Pending | UploadStatus::Paused)
            });
            if staged.is_none() && !resumable {
                let err = AppError::validation("No files selected for upload");
                state.record_error(err.message.clone());
                return Err(err);
            }
            state.set_phase(QueuePhase::Submitting);
        }
        self.shared.bump();

        if let Some(selection) = staged {
            let submitted = self
                .shared
                .bridge
                .add_files_to_queue(&selection.paths, &self.shared.options.key_config)
                .await;
            if let Err(e) = submitted {
                tracing::error!(count = selection.count, error = %e, "Failed to submit files");
                self.shared.fail_to_idle(&e).await;
                return Err(e);
            }
            self.shared.state.lock().await.take_staged();
            tracing::info!(count = selection.count, "Files submitted to upload queue");
        }

        if let Err(e) = self.shared.poll_once(false).await {
            tracing::warn!(error = %e, "Failed to refresh queue after submission");
        }

        {
            let mut state = self.shared.state.lock().await;
            // A stop issued during submission wins.
            if state.phase() != QueuePhase::Submitting {
                drop(state);
                tracing::info!("Upload stopped before processing started");
                self.shared.bump();
                return Err(AppError::conflict(
                    "Upload was stopped before processing started",
                ));
            }
            state.set_phase(QueuePhase::Uploading);
        }
        self.shared.uploading.send_replace(true);
        self.shared.bump();

        if let Err(e) = self.shared.bridge.start_processing().await {
            tracing::error!(error = %e, "Failed to start upload processing");
            self.shared.fail_to_idle(&e).await;
            return Err(e);
        }
        tracing::info!("Upload started");

        // Events may already have finished every item.
        let completed = self.shared.state.lock().await.check_completion();
        if let Some(items) = completed {
            self.shared.finish(items).await;
        }
        self.shared.bump();
        Ok(())
    }

    /// Stop processing. The local queue always leaves the uploading state.
    pub async fn stop(&self) -> AppResult<()> {
        let result = self.shared.bridge.stop_processing().await;
        {
            let mut state = self.shared.state.lock().await;
            state.set_phase(QueuePhase::Idle);
            if let Err(e) = &result {
                tracing::error!(error = %e, "Failed to stop upload processing");
                state.record_error(e.message.clone());
            }
        }
        self.shared.uploading.send_replace(false);
        self.shared.bump();
        tracing::info!("Upload stopped");
        result
    }

    /// Ask the backend to retry a failed item. Local state follows the
    /// backend's events; nothing is changed optimistically.
    pub async fn retry(&self, id: &str) -> AppResult<()> {
        match self.shared.bridge.retry_item(id).await {
            Ok(()) => {
                tracing::info!(item_id = %id, "Retry requested");
                Ok(())
            }
            Err(e) => {
                tracing::error!(item_id = %id, error = %e, "Failed to retry upload item");
                self.shared.record_error(&e).await;
                Err(e)
            }
        }
    }

    /// Remove an item from the backend, then from the local queue.
    pub async fn remove(&self, id: &str) -> AppResult<()> {
        if let Err(e) = self.shared.bridge.remove_item(id).await {
            tracing::error!(item_id = %id, error = %e, "Failed to remove upload item");
            self.shared.record_error(&e).await;
            return Err(e);
        }
        self.shared.state.lock().await.remove_item(id);
        self.shared.bump();
        Ok(())
    }

    /// Empty the backend queue, the local queue and the staged selection.
    pub async fn clear(&self) -> AppResult<()> {
        if let Err(e) = self.shared.bridge.clear_queue().await {
            tracing::error!(error = %e, "Failed to clear upload queue");
            self.shared.record_error(&e).await;
            return Err(e);
        }
        self.shared.state.lock().await.clear();
        self.shared.uploading.send_replace(false);
        self.shared.bump();
        tracing::info!("Upload queue cleared");
        Ok(())
    }

    /// Fetch a snapshot from the backend and merge it.
    ///
    /// Returns `Ignored(UploadInProgress)` while uploading.
    pub async fn refresh(&self) -> AppResult<ApplyOutcome> {
        match self.shared.poll_once(false).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.shared.record_error(&e).await;
                Err(e)
            }
        }
    }

    /// Merge an update directly, as the listener and poll loop do.
    pub async fn apply(&self, source: UpdateSource) -> ApplyOutcome {
        self.shared.apply(source).await
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> EngineSnapshot {
        let state = self.shared.state.lock().await;
        EngineSnapshot {
            items: state.items().to_vec(),
            stats: state.stats().clone(),
            backend_stats: state.backend_stats().cloned(),
            phase: state.phase(),
            is_uploading: state.is_uploading(),
            staged: state.staged().cloned(),
            last_error: state.last_error().map(str::to_string),
        }
    }

    /// Whether an upload is running.
    pub async fn is_uploading(&self) -> bool {
        self.shared.state.lock().await.is_uploading()
    }

    /// Record an error raised outside the engine.
    pub async fn report_error(&self, error: &AppError) {
        self.shared.record_error(error).await;
    }

    /// Dismiss the current error message.
    pub async fn dismiss_error(&self) {
        self.shared.state.lock().await.dismiss_error();
        self.shared.bump();
    }

    /// Receiver that changes after every state update.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Cancel the listener and the poll loop.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.is_cancelled() {
            tracing::debug!("Reconciliation engine shutting down");
            self.shared.shutdown.cancel();
        }
    }
}

impl Drop for ReconciliationEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn bump(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }

    async fn record_error(&self, error: &AppError) {
        self.state.lock().await.record_error(error.message.clone());
        self.bump();
    }

    async fn fail_to_idle(&self, error: &AppError) {
        {
            let mut state = self.state.lock().await;
            state.set_phase(QueuePhase::Idle);
            state.record_error(error.message.clone());
        }
        self.uploading.send_replace(false);
        self.bump();
    }

    async fn apply(&self, source: UpdateSource) -> ApplyOutcome {
        let outcome = self.state.lock().await.apply_update(source);
        match &outcome {
            ApplyOutcome::Ignored(IgnoreReason::UnknownItem) => {
                tracing::debug!("Progress event for unknown item ignored");
            }
            ApplyOutcome::Ignored(IgnoreReason::UploadInProgress) => {
                tracing::debug!("Queue snapshot ignored while uploading");
            }
            ApplyOutcome::Completed(items) => self.finish(items.clone()).await,
            ApplyOutcome::Applied => {}
        }
        self.bump();
        outcome
    }

    /// Fetch items and statistics and merge them as one snapshot.
    ///
    /// With `require_idle` the snapshot is dropped unless the queue is
    /// idle when it arrives, so a slow background poll cannot overwrite a
    /// submission that started in the meantime.
    async fn poll_once(&self, require_idle: bool) -> AppResult<ApplyOutcome> {
        let items = self.bridge.get_queue_items().await?;
        let statistics = match self.bridge.get_queue_status().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch queue statistics");
                None
            }
        };

        let outcome = {
            let mut state = self.state.lock().await;
            if require_idle && state.phase() != QueuePhase::Idle {
                return Ok(ApplyOutcome::Ignored(IgnoreReason::UploadInProgress));
            }
            state.apply_update(UpdateSource::Poll(PollSnapshot { items, statistics }))
        };
        if let ApplyOutcome::Completed(items) = &outcome {
            self.finish(items.clone()).await;
        }
        self.bump();
        Ok(outcome)
    }

    async fn finish(&self, completed: Vec<UploadItem>) {
        self.uploading.send_replace(false);
        tracing::info!(completed = completed.len(), "Upload queue finished");

        let handler = self.on_complete.read().await.clone();
        if let Some(handler) = handler {
            handler(completed);
        }

        // A new run may have started while the handler ran.
        if self.state.lock().await.phase() != QueuePhase::Idle {
            tracing::debug!("New upload started, backend left running");
            return;
        }
        if let Err(e) = self.bridge.stop_processing().await {
            tracing::warn!(error = %e, "Failed to stop processing after completion");
        }
    }
}

async fn listen(shared: Arc<Shared>, mut subscription: ProgressSubscription, cancel: CancellationToken) {
    tracing::debug!("Progress listener started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = subscription.next() => match event {
                Some(event) => {
                    shared.apply(UpdateSource::Event(event)).await;
                }
                None => {
                    tracing::warn!("Progress stream closed by backend");
                    break;
                }
            },
        }
    }
    subscription.unsubscribe();
    tracing::debug!("Progress listener stopped");
}

async fn poll_loop(shared: Arc<Shared>, mut uploading: watch::Receiver<bool>) {
    loop {
        let resumed = tokio::select! {
            _ = shared.shutdown.cancelled() => false,
            res = uploading.wait_for(|u| !*u) => res.is_ok(),
        };
        if !resumed {
            break;
        }

        let mut ticker = tokio::time::interval(shared.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shared.shutdown.cancelled() => return,
                changed = uploading.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if *uploading.borrow_and_update() {
                        tracing::debug!("Queue polling suspended while uploading");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = shared.poll_once(true).await {
                        tracing::warn!(error = %e, "Queue poll failed");
                    }
                }
            }
        }
    }
    tracing::debug!("Queue poll loop stopped");
}

//! Command bridge trait for talking to the upload backend.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::result::AppResult;
use crate::tier::UploadConfig;
use crate::types::{FileSelection, ProgressEvent, QueueStatistics, S3KeyConfig, UploadItem};

/// A stream of progress events pushed by the backend.
pub type ProgressStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

/// A live registration on the backend's progress event stream.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// releases the listener on the backend side.
pub struct ProgressSubscription {
    stream: ProgressStream,
}

impl ProgressSubscription {
    /// Wrap a backend event stream.
    pub fn new(stream: ProgressStream) -> Self {
        Self { stream }
    }

    /// Wait for the next event; `None` once the backend closed the stream.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.stream.next().await
    }

    /// Tear down the listener.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for ProgressSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSubscription").finish()
    }
}

/// Asynchronous request/response and event channel to the backend that
/// owns the upload queue.
///
/// The backend is the source of truth for queue state; implementations
/// only forward commands and report what the backend answered. A command
/// that cannot be delivered fails with [`ErrorKind::Transport`].
///
/// [`ErrorKind::Transport`]: crate::error::ErrorKind::Transport
#[async_trait]
pub trait CommandBridge: Send + Sync + fmt::Debug + 'static {
    /// Replace the backend queue configuration and empty the queue.
    async fn initialize_queue(&self, config: &UploadConfig) -> AppResult<()>;

    /// Enqueue files; fails if none of them could be added.
    ///
    /// All or nothing: an error means no item was enqueued, so the caller
    /// may resubmit the same paths. Paths the backend skips (missing on
    /// disk) do not fail the call.
    async fn add_files_to_queue(&self, paths: &[String], key_config: &S3KeyConfig)
    -> AppResult<()>;

    /// Begin processing pending items.
    async fn start_processing(&self) -> AppResult<()>;

    /// Halt processing; in-flight items are paused.
    async fn stop_processing(&self) -> AppResult<()>;

    /// Return a failed item to the pending state.
    async fn retry_item(&self, id: &str) -> AppResult<()>;

    /// Remove an item from the queue.
    async fn remove_item(&self, id: &str) -> AppResult<()>;

    /// Remove every item from the queue.
    async fn clear_queue(&self) -> AppResult<()>;

    /// Snapshot of all items in submission order.
    async fn get_queue_items(&self) -> AppResult<Vec<UploadItem>>;

    /// Backend-computed queue statistics.
    async fn get_queue_status(&self) -> AppResult<QueueStatistics>;

    /// Ask the user to pick files, optionally filtered by extension.
    async fn open_file_picker(&self, multiple: bool, filter: Option<&str>)
    -> AppResult<FileSelection>;

    /// Register a listener on the progress event stream.
    async fn on_progress(&self) -> AppResult<ProgressSubscription>;
}

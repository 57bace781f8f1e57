//! Push-style progress events emitted by the backend.

use serde::{Deserialize, Serialize};

use super::item::UploadStatus;

/// Progress update for a single queue item, keyed by `item_id`.
///
/// The backend is the single writer of item state, so an event is
/// always newer than whatever the local cache holds for that item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Identifier of the queue item this event belongs to.
    pub item_id: String,
    /// Bytes confirmed transferred so far.
    pub uploaded_bytes: u64,
    /// Total size of the item as the backend sees it.
    pub total_bytes: u64,
    /// Backend-computed percentage.
    pub percentage: f64,
    /// Current transfer rate in MB/s.
    pub speed_mbps: f64,
    /// Remaining time estimate.
    pub eta_seconds: Option<u64>,
    /// Item status after this update.
    pub status: UploadStatus,
    /// Failure reason when `status` is `Failed`.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ProgressEvent {
    /// Build an event with the percentage derived from the byte counters.
    pub fn from_bytes(
        item_id: impl Into<String>,
        uploaded_bytes: u64,
        total_bytes: u64,
        speed_mbps: f64,
        status: UploadStatus,
    ) -> Self {
        let percentage = if total_bytes == 0 {
            0.0
        } else {
            super::clamp_percent(uploaded_bytes as f64 / total_bytes as f64 * 100.0)
        };
        Self {
            item_id: item_id.into(),
            uploaded_bytes,
            total_bytes,
            percentage,
            speed_mbps,
            eta_seconds: None,
            status,
            error_message: None,
        }
    }

    /// Attach a remaining-time estimate.
    pub fn with_eta(mut self, eta_seconds: Option<u64>) -> Self {
        self.eta_seconds = eta_seconds;
        self
    }

    /// Attach a failure reason.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

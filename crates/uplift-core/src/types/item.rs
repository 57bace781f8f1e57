//! Upload queue items and their lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::clamp_percent;

/// Transfer status of a single queue item.
///
/// `Pending → InProgress → {Completed | Failed | Cancelled}`, with
/// `Failed → Pending` when the item is retried. `Paused` is entered when
/// processing is stopped while the item was transferring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadStatus {
    /// Waiting for a free upload slot.
    Pending,
    /// Bytes are being transferred.
    InProgress,
    /// The object was fully written to S3.
    Completed,
    /// The transfer gave up; see `error_message`.
    Failed,
    /// Processing was stopped mid-transfer.
    Paused,
    /// The item was cancelled and will not be uploaded.
    Cancelled,
}

impl UploadStatus {
    /// Whether no further transitions happen without user action.
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Completed | Self::Failed | Self::Cancelled => true,
            Self::Pending | Self::InProgress | Self::Paused => false,
        }
    }

    /// Whether the item is actively transferring.
    pub fn is_active(self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Paused => write!(f, "paused"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One file's transfer state as tracked by the backend queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadItem {
    /// Backend-assigned identifier, stable for the queue session.
    pub id: String,
    /// Absolute source path.
    pub file_path: String,
    /// File name used for display.
    pub file_name: String,
    /// Total size in bytes, fixed at creation.
    pub file_size: u64,
    /// Destination object key.
    pub s3_key: String,
    /// Current status.
    pub status: UploadStatus,
    /// Percentage as last reported by the backend (informational only).
    pub progress: f64,
    /// Bytes confirmed transferred, never above `file_size`.
    pub uploaded_bytes: u64,
    /// Last reported transfer rate in MB/s.
    pub speed_mbps: f64,
    /// Remaining time estimate, only meaningful while in progress.
    pub eta_seconds: Option<u64>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the first transfer attempt.
    pub started_at: Option<String>,
    /// RFC 3339 timestamp of completion.
    pub completed_at: Option<String>,
    /// Failure reason, present only when `status` is `Failed`.
    pub error_message: Option<String>,
    /// Number of retries already requested.
    pub retry_count: u32,
}

impl UploadItem {
    /// Create a fresh pending item.
    pub fn pending(
        id: impl Into<String>,
        file_path: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        s3_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            file_path: file_path.into(),
            file_name: file_name.into(),
            file_size,
            s3_key: s3_key.into(),
            status: UploadStatus::Pending,
            progress: 0.0,
            uploaded_bytes: 0,
            speed_mbps: 0.0,
            eta_seconds: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
        }
    }

    /// Set the transferred byte count, clamped to the file size.
    pub fn set_uploaded_bytes(&mut self, bytes: u64) {
        self.uploaded_bytes = bytes.min(self.file_size);
    }

    /// Percentage for display, derived from bytes and clamped to `[0, 100]`.
    ///
    /// A zero-byte file reports 100 once completed and 0 otherwise.
    pub fn display_percent(&self) -> f64 {
        if self.file_size == 0 {
            return if self.status == UploadStatus::Completed {
                100.0
            } else {
                0.0
            };
        }
        clamp_percent(self.uploaded_bytes as f64 / self.file_size as f64 * 100.0)
    }

    /// Normalize fields that a late or malformed update may have left
    /// inconsistent.
    pub fn normalize(&mut self) {
        self.uploaded_bytes = self.uploaded_bytes.min(self.file_size);
        self.progress = clamp_percent(self.progress);
        self.speed_mbps = super::finite_non_negative(self.speed_mbps);
        if self.status != UploadStatus::Failed {
            self.error_message = None;
        }
        if self.status != UploadStatus::InProgress {
            self.eta_seconds = None;
        }
    }
}

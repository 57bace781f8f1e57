//! Aggregate statistics over an upload queue.

use serde::{Deserialize, Serialize};

/// Totals derived locally from the item list.
///
/// Never stored authoritatively: recomputed from scratch whenever the
/// local queue changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Sum of `file_size` across items.
    pub total_bytes: u64,
    /// Sum of `uploaded_bytes` across items.
    pub uploaded_bytes: u64,
    /// `uploaded_bytes / total_bytes * 100`, clamped to `[0, 100]`.
    pub overall_progress_percent: f64,
    /// Number of `Completed` items.
    pub completed_count: usize,
    /// Number of `Failed` items.
    pub failed_count: usize,
    /// Number of items in the queue.
    pub total_count: usize,
    /// Sum of `speed_mbps` over `InProgress` items.
    pub active_speed_mbps: f64,
    /// Remaining time at the current active speed.
    pub eta_seconds: Option<u64>,
}

impl AggregateStats {
    /// Overall progress rounded to a whole percent for display.
    pub fn rounded_progress(&self) -> u8 {
        self.overall_progress_percent.round().clamp(0.0, 100.0) as u8
    }
}

/// Queue statistics as reported by the backend's status command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatistics {
    /// Number of items.
    pub total_files: u64,
    /// Number of completed items.
    pub completed_files: u64,
    /// Number of failed items.
    pub failed_files: u64,
    /// Number of pending items.
    pub pending_files: u64,
    /// Number of items being transferred.
    pub in_progress_files: u64,
    /// Sum of file sizes.
    pub total_bytes: u64,
    /// Sum of transferred bytes.
    pub uploaded_bytes: u64,
    /// Mean speed over active transfers in MB/s.
    pub average_speed_mbps: f64,
    /// Remaining time at the average speed.
    pub estimated_time_remaining: Option<u64>,
}

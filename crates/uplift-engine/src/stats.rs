//! Aggregate statistics over the local queue.

use uplift_core::types::{
    AggregateStats, BYTES_PER_MB, UploadItem, UploadStatus, clamp_percent, finite_non_negative,
};

/// Recompute aggregate statistics from scratch.
///
/// Per-item byte counts are clamped to their file size, and every
/// floating point intermediate that is negative or not finite counts as
/// zero, so nothing but a value in `[0, 100]` reaches the display.
pub fn aggregate(items: &[UploadItem]) -> AggregateStats {
    let mut stats = AggregateStats {
        total_count: items.len(),
        ..Default::default()
    };

    for item in items {
        stats.total_bytes = stats.total_bytes.saturating_add(item.file_size);
        stats.uploaded_bytes = stats
            .uploaded_bytes
            .saturating_add(item.uploaded_bytes.min(item.file_size));
        match item.status {
            UploadStatus::Completed => stats.completed_count += 1,
            UploadStatus::Failed => stats.failed_count += 1,
            UploadStatus::InProgress => {
                stats.active_speed_mbps += finite_non_negative(item.speed_mbps);
            }
            UploadStatus::Pending | UploadStatus::Paused | UploadStatus::Cancelled => {}
        }
    }

    stats.overall_progress_percent = if stats.total_bytes == 0 {
        0.0
    } else {
        clamp_percent(stats.uploaded_bytes as f64 / stats.total_bytes as f64 * 100.0)
    };
    stats.active_speed_mbps = finite_non_negative(stats.active_speed_mbps);

    stats.eta_seconds = if stats.active_speed_mbps > 0.0 {
        let remaining_mb = stats.total_bytes.saturating_sub(stats.uploaded_bytes) as f64 / BYTES_PER_MB;
        let eta = finite_non_negative(remaining_mb / stats.active_speed_mbps);
        Some(eta.ceil() as u64)
    } else {
        None
    };

    stats
}

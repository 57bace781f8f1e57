//! Backend-side upload queue state.
//!
//! This is the authoritative queue the loopback bridge exposes through
//! its commands. The transfer driver advances it tick by tick.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use uplift_core::error::AppError;
use uplift_core::result::AppResult;
use uplift_core::tier::UploadConfig;
use uplift_core::types::{
    BYTES_PER_MB, ProgressEvent, QueueStatistics, S3KeyConfig, UploadItem, UploadStatus,
};

use crate::keys::generate_s3_key;

/// Message attached to items failed by injected faults.
pub const SIMULATED_FAILURE_MESSAGE: &str = "Simulated transfer failure";

/// Items plus processing flags for one queue session.
#[derive(Debug, Default)]
pub struct BackendQueue {
    /// Items in submission order.
    pub items: Vec<UploadItem>,
    /// Active configuration; `None` until initialized.
    pub config: Option<UploadConfig>,
    /// Whether the transfer driver should keep running.
    pub is_processing: bool,
    /// File names whose first attempt fails halfway.
    pub fail_first_attempt: HashSet<String>,
}

impl BackendQueue {
    /// Create an empty, uninitialized queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a configuration, dropping every item.
    pub fn initialize(&mut self, config: UploadConfig) {
        self.config = Some(config);
        self.items.clear();
        self.is_processing = false;
    }

    /// Items currently transferring.
    pub fn active_count(&self) -> usize {
        self.items.iter().filter(|i| i.status.is_active()).count()
    }

    /// Items waiting for a slot.
    pub fn pending_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == UploadStatus::Pending)
            .count()
    }

    /// Free tier admits new files only when nothing is queued or running.
    pub fn check_free_tier_limits(&self, new_files: usize) -> AppResult<()> {
        let Some(config) = &self.config else {
            return Ok(());
        };
        if config.max_concurrent_uploads != 1 || new_files == 0 {
            return Ok(());
        }
        let active = self.active_count();
        if active > 0 {
            return Err(AppError::submission(format!(
                "Free tier processes one file at a time; {active} file(s) still uploading"
            )));
        }
        let pending = self.pending_count();
        if pending > 0 {
            return Err(AppError::submission(format!(
                "Free tier cannot add files while {pending} file(s) are waiting"
            )));
        }
        Ok(())
    }

    /// Stat and enqueue files, returning the names that were added.
    ///
    /// Missing paths are skipped; adding nothing is an error.
    pub fn add_files(&mut self, paths: &[String], key_config: &S3KeyConfig) -> AppResult<Vec<String>> {
        if self.config.is_none() {
            return Err(AppError::configuration("Upload queue not initialized"));
        }
        self.check_free_tier_limits(paths.len())?;

        let mut staged = Vec::with_capacity(paths.len());
        for file_path in paths {
            let path = Path::new(file_path);
            if !path.exists() {
                tracing::warn!(file_path = %file_path, "File does not exist, skipping");
                continue;
            }
            let metadata = std::fs::metadata(path).map_err(|e| {
                AppError::with_source(
                    uplift_core::error::ErrorKind::Submission,
                    format!("Failed to read metadata for {file_path}"),
                    e,
                )
            })?;
            let file_name = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            let s3_key = generate_s3_key(file_path, key_config)?;
            staged.push(UploadItem::pending(
                Uuid::new_v4().to_string(),
                file_path.clone(),
                file_name,
                metadata.len(),
                s3_key,
            ));
        }

        if staged.is_empty() {
            return Err(AppError::submission(
                "No valid files were added to the upload queue",
            ));
        }

        let names = staged.iter().map(|i| i.file_name.clone()).collect();
        self.items.extend(staged);
        Ok(names)
    }

    /// Remove an item by id.
    pub fn remove(&mut self, id: &str) -> AppResult<()> {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        if self.items.len() == before {
            return Err(AppError::not_found(format!("Upload item not found: {id}")));
        }
        Ok(())
    }

    /// Send a failed item back to pending.
    pub fn retry(&mut self, id: &str) -> AppResult<()> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::not_found(format!("Upload item not found: {id}")))?;
        if item.status != UploadStatus::Failed {
            return Err(AppError::conflict(format!("Item {id} is not in failed state")));
        }
        item.status = UploadStatus::Pending;
        item.progress = 0.0;
        item.uploaded_bytes = 0;
        item.speed_mbps = 0.0;
        item.error_message = None;
        item.retry_count += 1;
        Ok(())
    }

    /// Stop processing; transferring items become paused.
    pub fn stop(&mut self) {
        self.is_processing = false;
        for item in self.items.iter_mut().filter(|i| i.status.is_active()) {
            item.status = UploadStatus::Paused;
            item.speed_mbps = 0.0;
            item.eta_seconds = None;
        }
    }

    /// Stop processing and drop every item.
    pub fn clear(&mut self) {
        self.is_processing = false;
        self.items.clear();
    }

    /// Whether every item reached a terminal status.
    pub fn is_drained(&self) -> bool {
        self.items.iter().all(|i| i.status.is_terminal())
    }

    /// Backend statistics over the current items.
    pub fn statistics(&self) -> QueueStatistics {
        let count = |status: UploadStatus| self.items.iter().filter(|i| i.status == status).count() as u64;
        let total_bytes: u64 = self.items.iter().map(|i| i.file_size).sum();
        let uploaded_bytes: u64 = self.items.iter().map(|i| i.uploaded_bytes).sum();

        let active: Vec<f64> = self
            .items
            .iter()
            .filter(|i| i.status.is_active())
            .map(|i| i.speed_mbps)
            .collect();
        let average_speed_mbps = if active.is_empty() {
            0.0
        } else {
            active.iter().sum::<f64>() / active.len() as f64
        };
        let estimated_time_remaining = if average_speed_mbps > 0.0 {
            let remaining_mb = total_bytes.saturating_sub(uploaded_bytes) as f64 / BYTES_PER_MB;
            Some((remaining_mb / average_speed_mbps) as u64)
        } else {
            None
        };

        QueueStatistics {
            total_files: self.items.len() as u64,
            completed_files: count(UploadStatus::Completed),
            failed_files: count(UploadStatus::Failed),
            pending_files: count(UploadStatus::Pending),
            in_progress_files: count(UploadStatus::InProgress),
            total_bytes,
            uploaded_bytes,
            average_speed_mbps,
            estimated_time_remaining,
        }
    }

    /// Advance the simulated transfer by one tick of `tick_secs` seconds.
    ///
    /// Fills free slots with pending (or paused) items, moves each active
    /// item forward by one chunk per concurrent part, and returns one
    /// progress event per item that changed.
    pub fn advance(&mut self, tick_secs: f64) -> Vec<ProgressEvent> {
        let Some(config) = self.config.clone() else {
            return Vec::new();
        };

        let mut slots = config.max_concurrent_uploads.saturating_sub(self.active_count());
        let now = Utc::now().to_rfc3339();
        for item in self.items.iter_mut() {
            if slots == 0 {
                break;
            }
            if matches!(item.status, UploadStatus::Pending | UploadStatus::Paused) {
                item.status = UploadStatus::InProgress;
                item.started_at.get_or_insert_with(|| now.clone());
                slots -= 1;
                tracing::debug!(item_id = %item.id, file = %item.file_name, "Upload started");
            }
        }

        let step = (config.chunk_size_mb as f64 * BYTES_PER_MB) as u64 * config.max_concurrent_parts as u64;
        let mut events = Vec::new();
        for item in self.items.iter_mut().filter(|i| i.status.is_active()) {
            let sent = step.min(item.file_size - item.uploaded_bytes);
            item.uploaded_bytes += sent;
            item.speed_mbps = if tick_secs > 0.0 {
                sent as f64 / BYTES_PER_MB / tick_secs
            } else {
                0.0
            };
            item.progress = item.display_percent();

            let half_way = item.uploaded_bytes * 2 >= item.file_size;
            if item.retry_count == 0 && half_way && self.fail_first_attempt.contains(&item.file_name) {
                item.status = UploadStatus::Failed;
                item.speed_mbps = 0.0;
                item.eta_seconds = None;
                item.error_message = Some(SIMULATED_FAILURE_MESSAGE.to_string());
                events.push(
                    ProgressEvent::from_bytes(&item.id, item.uploaded_bytes, item.file_size, 0.0, item.status)
                        .with_error(SIMULATED_FAILURE_MESSAGE),
                );
                continue;
            }

            if item.uploaded_bytes >= item.file_size {
                item.status = UploadStatus::Completed;
                item.completed_at = Some(now.clone());
                item.progress = 100.0;
                item.eta_seconds = None;
            } else if item.speed_mbps > 0.0 {
                let remaining_mb = (item.file_size - item.uploaded_bytes) as f64 / BYTES_PER_MB;
                item.eta_seconds = Some((remaining_mb / item.speed_mbps).ceil() as u64);
            }

            events.push(
                ProgressEvent::from_bytes(
                    &item.id,
                    item.uploaded_bytes,
                    item.file_size,
                    item.speed_mbps,
                    item.status,
                )
                .with_eta(item.eta_seconds),
            );
        }
        events
    }
}

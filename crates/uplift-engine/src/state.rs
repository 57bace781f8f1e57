//! Local queue state and the single merge entry point.
//!
//! [`QueueState`] is the engine's explicit state container. Both update
//! sources, push events and poll snapshots, go through
//! [`QueueState::apply_update`], which enforces that a snapshot never
//! lands while an upload is running.

use std::collections::HashSet;

use serde::Serialize;

use uplift_core::types::{
    AggregateStats, FileSelection, ProgressEvent, QueueStatistics, UploadItem, UploadStatus,
    clamp_percent, finite_non_negative,
};

use crate::stats::aggregate;

/// Queue-level lifecycle: `Idle → Submitting → Uploading → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueuePhase {
    /// Nothing is being transferred.
    Idle,
    /// Staged files are being handed to the backend.
    Submitting,
    /// The backend is processing the queue.
    Uploading,
}

/// Full-state snapshot fetched from the backend.
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    /// Every queue item in submission order.
    pub items: Vec<UploadItem>,
    /// Backend statistics, if they were fetched.
    pub statistics: Option<QueueStatistics>,
}

/// Where an update came from.
#[derive(Debug, Clone)]
pub enum UpdateSource {
    /// A push-style progress event for one item.
    Event(ProgressEvent),
    /// A pull-style full snapshot.
    Poll(PollSnapshot),
}

/// Why an update was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event names an item the local queue does not know yet.
    UnknownItem,
    /// A snapshot arrived while uploading and would clobber fresher state.
    UploadInProgress,
}

/// Result of [`QueueState::apply_update`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The update was merged.
    Applied,
    /// The update was dropped.
    Ignored(IgnoreReason),
    /// The update was merged and finished the queue; carries the
    /// `Completed` items.
    Completed(Vec<UploadItem>),
}

/// The engine's owned view of the backend queue.
#[derive(Debug, Clone)]
pub struct QueueState {
    items: Vec<UploadItem>,
    stats: AggregateStats,
    backend_stats: Option<QueueStatistics>,
    phase: QueuePhase,
    staged: Option<FileSelection>,
    last_error: Option<String>,
}

impl Default for QueueState {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueState {
    /// Create an empty, idle state.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            stats: AggregateStats::default(),
            backend_stats: None,
            phase: QueuePhase::Idle,
            staged: None,
            last_error: None,
        }
    }

    /// Items in submission order.
    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    /// Look up one item.
    pub fn item(&self, id: &str) -> Option<&UploadItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Aggregate statistics of the current items.
    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    /// Last statistics reported by the backend.
    pub fn backend_stats(&self) -> Option<&QueueStatistics> {
        self.backend_stats.as_ref()
    }

    /// Current queue phase.
    pub fn phase(&self) -> QueuePhase {
        self.phase
    }

    /// Whether the backend is processing the queue.
    pub fn is_uploading(&self) -> bool {
        self.phase == QueuePhase::Uploading
    }

    /// Files picked but not yet submitted.
    pub fn staged(&self) -> Option<&FileSelection> {
        self.staged.as_ref()
    }

    /// The single current error message.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Merge an update from either source.
    pub fn apply_update(&mut self, source: UpdateSource) -> ApplyOutcome {
        match source {
            UpdateSource::Event(event) => {
                if !self.apply_event(event) {
                    return ApplyOutcome::Ignored(IgnoreReason::UnknownItem);
                }
            }
            UpdateSource::Poll(snapshot) => {
                if self.is_uploading() {
                    return ApplyOutcome::Ignored(IgnoreReason::UploadInProgress);
                }
                self.replace_items(snapshot);
            }
        }

        self.recompute();
        match self.check_completion() {
            Some(completed) => ApplyOutcome::Completed(completed),
            None => ApplyOutcome::Applied,
        }
    }

    fn apply_event(&mut self, event: ProgressEvent) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.id == event.item_id) else {
            return false;
        };

        item.set_uploaded_bytes(event.uploaded_bytes);
        item.progress = clamp_percent(event.percentage);
        item.speed_mbps = finite_non_negative(event.speed_mbps);
        item.eta_seconds = event.eta_seconds;
        item.error_message = match event.status {
            UploadStatus::Failed => event.error_message.or_else(|| item.error_message.take()),
            _ => None,
        };
        item.status = event.status;
        item.normalize();
        true
    }

    fn replace_items(&mut self, snapshot: PollSnapshot) {
        let mut seen = HashSet::with_capacity(snapshot.items.len());
        self.items = snapshot
            .items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .map(|mut item| {
                item.normalize();
                item
            })
            .collect();
        if snapshot.statistics.is_some() {
            self.backend_stats = snapshot.statistics;
        }
    }

    fn recompute(&mut self) {
        self.stats = aggregate(&self.items);
    }

    /// Finish the upload if every item reached a terminal status.
    ///
    /// Only fires on the transition out of `Uploading`, so an idle queue
    /// that is already finished does not report completion again.
    pub fn check_completion(&mut self) -> Option<Vec<UploadItem>> {
        if !self.is_uploading() || self.items.is_empty() {
            return None;
        }
        if !self.items.iter().all(|i| i.status.is_terminal()) {
            return None;
        }
        self.phase = QueuePhase::Idle;
        Some(
            self.items
                .iter()
                .filter(|i| i.status == UploadStatus::Completed)
                .cloned()
                .collect(),
        )
    }

    /// Move to a new phase.
    pub fn set_phase(&mut self, phase: QueuePhase) {
        self.phase = phase;
    }

    /// Stage a picker selection for the next start.
    pub fn stage(&mut self, selection: FileSelection) {
        self.staged = if selection.is_empty() {
            None
        } else {
            Some(selection)
        };
    }

    /// Drop the staged selection, returning it.
    pub fn take_staged(&mut self) -> Option<FileSelection> {
        self.staged.take()
    }

    /// Remove one item locally.
    pub fn remove_item(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        let removed = self.items.len() != before;
        if removed {
            self.recompute();
        }
        removed
    }

    /// Empty the queue and the staged selection.
    pub fn clear(&mut self) {
        self.items.clear();
        self.staged = None;
        self.backend_stats = None;
        self.phase = QueuePhase::Idle;
        self.recompute();
    }

    /// Replace the current error message.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Dismiss the current error message.
    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }
}

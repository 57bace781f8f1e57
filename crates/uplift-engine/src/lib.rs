//! # uplift-engine
//!
//! Upload queue reconciliation for Uplift. The engine merges push-style
//! progress events and periodic queue snapshots into one local state,
//! derives aggregate statistics, and detects when a queue finishes. The
//! manager layers user intents and tier checks on top.

pub mod engine;
pub mod manager;
pub mod state;
pub mod stats;

pub use engine::{CompletionHandler, EngineOptions, EngineSnapshot, ReconciliationEngine};
pub use manager::UploadManager;
pub use state::{ApplyOutcome, IgnoreReason, PollSnapshot, QueuePhase, QueueState, UpdateSource};

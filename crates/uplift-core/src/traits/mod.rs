//! Core traits defined in `uplift-core` and implemented by other crates.

pub mod bridge;

pub use bridge::{CommandBridge, ProgressStream, ProgressSubscription};

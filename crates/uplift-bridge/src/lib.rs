//! # uplift-bridge
//!
//! Loopback implementation of the Uplift command bridge. The backend
//! queue, key generation, file picker and a simulated transfer driver all
//! run in-process, which makes the reconciliation engine runnable and
//! testable without an external upload service.

pub mod driver;
pub mod keys;
pub mod memory;
pub mod picker;
pub mod pubsub;
pub mod queue;

pub use memory::MemoryBridge;

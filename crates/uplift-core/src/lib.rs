//! # uplift-core
//!
//! Core crate for Uplift. Contains the upload domain types, the tier
//! configuration resolver, the command bridge trait, runtime configuration
//! schemas, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Uplift crates.

pub mod config;
pub mod error;
pub mod result;
pub mod tier;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
pub use tier::{UploadConfig, UploadTier};
pub use traits::bridge::{CommandBridge, ProgressSubscription};

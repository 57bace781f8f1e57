//! Convenience result type alias for Uplift.

use crate::error::AppError;

/// A specialized `Result` type for Uplift operations.
pub type AppResult<T> = Result<T, AppError>;

//! Domain types shared by the bridge and the reconciliation engine.

pub mod credentials;
pub mod item;
pub mod key;
pub mod progress;
pub mod selection;
pub mod stats;

pub use credentials::AwsCredentials;
pub use item::{UploadItem, UploadStatus};
pub use key::S3KeyConfig;
pub use progress::ProgressEvent;
pub use selection::FileSelection;
pub use stats::{AggregateStats, QueueStatistics};

/// Number of bytes in one mebibyte, used for all MB/Mbps conversions.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Coerce a floating point intermediate into a finite, non-negative value.
///
/// NaN, infinities and negative numbers all collapse to `0.0`.
pub fn finite_non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Clamp a percentage into `[0, 100]`, treating non-finite input as 0.
pub fn clamp_percent(value: f64) -> f64 {
    finite_non_negative(value).min(100.0)
}

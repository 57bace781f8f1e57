//! Tier configuration resolver.
//!
//! Maps a selected [`UploadTier`] plus credentials and bucket into the
//! concrete [`UploadConfig`] handed to the backend queue. Resolution is
//! pure: no state is held and no side effects are triggered, so switching
//! tiers is always a full replacement of the previous configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::AppError;
use crate::types::credentials::AwsCredentials;

/// S3 multipart minimum part size, and the fixed Free tier chunk size.
pub const MIN_CHUNK_SIZE_MB: u64 = 5;
/// Upper bound of the Premium adaptive chunk range.
pub const PREMIUM_MAX_CHUNK_SIZE_MB: u64 = 100;
/// Largest chunk size a Premium user may configure.
pub const CONFIGURABLE_MAX_CHUNK_SIZE_MB: u64 = 1024;

/// Feature tier of the upload engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadTier {
    /// Sequential uploads with fixed 5 MB chunks.
    #[serde(alias = "free")]
    Free,
    /// Parallel uploads, adaptive chunking, resume.
    #[serde(alias = "premium")]
    Premium,
}

impl fmt::Display for UploadTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

impl FromStr for UploadTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            other => Err(AppError::configuration(format!(
                "Unknown upload tier '{other}' (expected 'free' or 'premium')"
            ))),
        }
    }
}

/// Immutable snapshot of the settings the backend queue runs with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Credentials for the target account.
    pub aws_credentials: AwsCredentials,
    /// Target bucket.
    pub bucket_name: String,
    /// Files transferred at the same time.
    pub max_concurrent_uploads: usize,
    /// Default chunk size in MB.
    pub chunk_size_mb: u64,
    /// Attempts per item before it is marked failed.
    pub retry_attempts: u32,
    /// Per-item timeout in seconds.
    pub timeout_seconds: u64,
    /// Write a metadata record for each uploaded object.
    pub auto_create_metadata: bool,
    /// Key prefix for uploaded objects.
    pub s3_key_prefix: Option<String>,
    /// Parts of one file transferred at the same time.
    pub max_concurrent_parts: usize,
    /// Whether chunk size adapts to throughput.
    pub adaptive_chunk_size: bool,
    /// Lower chunk size bound in MB.
    pub min_chunk_size_mb: u64,
    /// Upper chunk size bound in MB.
    pub max_chunk_size_mb: u64,
    /// Optional bandwidth cap in MB/s.
    pub bandwidth_limit_mbps: Option<f64>,
    /// Whether interrupted uploads can be resumed.
    pub enable_resume: bool,
    /// Tier this configuration was resolved from.
    pub tier: UploadTier,
}

/// Resolve the upload configuration for a tier.
///
/// Callers must validate credentials and bucket beforehand; this function
/// never fails.
pub fn resolve(credentials: AwsCredentials, bucket: impl Into<String>, tier: UploadTier) -> UploadConfig {
    UploadConfig::new(credentials, bucket.into(), tier)
}

impl UploadConfig {
    /// Build the configuration for `tier` from the policy table.
    pub fn new(aws_credentials: AwsCredentials, bucket_name: String, tier: UploadTier) -> Self {
        let base = Self {
            aws_credentials,
            bucket_name,
            auto_create_metadata: true,
            s3_key_prefix: Some("uploads".to_string()),
            bandwidth_limit_mbps: None,
            tier,
            max_concurrent_uploads: 1,
            chunk_size_mb: MIN_CHUNK_SIZE_MB,
            retry_attempts: 3,
            timeout_seconds: 600,
            max_concurrent_parts: 1,
            adaptive_chunk_size: false,
            min_chunk_size_mb: MIN_CHUNK_SIZE_MB,
            max_chunk_size_mb: MIN_CHUNK_SIZE_MB,
            enable_resume: false,
        };

        match tier {
            UploadTier::Free => base,
            UploadTier::Premium => Self {
                max_concurrent_uploads: 8,
                chunk_size_mb: 10,
                retry_attempts: 10,
                timeout_seconds: 1800,
                max_concurrent_parts: 8,
                adaptive_chunk_size: true,
                min_chunk_size_mb: MIN_CHUNK_SIZE_MB,
                max_chunk_size_mb: PREMIUM_MAX_CHUNK_SIZE_MB,
                enable_resume: true,
                ..base
            },
        }
    }

    /// Check that a Free tier configuration has not been loosened.
    pub fn validate_free_tier_limits(&self) -> Result<(), AppError> {
        if self.tier != UploadTier::Free {
            return Ok(());
        }
        if self.max_concurrent_uploads > 1 {
            return Err(AppError::configuration(
                "Free tier allows only one concurrent upload",
            ));
        }
        if self.max_concurrent_parts > 1 {
            return Err(AppError::configuration(
                "Free tier does not support parallel chunk uploads",
            ));
        }
        if self.adaptive_chunk_size {
            return Err(AppError::configuration(
                "Free tier does not support adaptive chunk sizing",
            ));
        }
        if self.chunk_size_mb != MIN_CHUNK_SIZE_MB
            || self.min_chunk_size_mb != MIN_CHUNK_SIZE_MB
            || self.max_chunk_size_mb != MIN_CHUNK_SIZE_MB
        {
            return Err(AppError::configuration(format!(
                "Free tier chunk size is fixed at {MIN_CHUNK_SIZE_MB} MB"
            )));
        }
        Ok(())
    }

    /// Apply user-tunable settings, producing a new configuration.
    ///
    /// Only Premium exposes tunables; on Free this returns a configuration
    /// error and leaves the caller's configuration untouched.
    pub fn with_settings(&self, settings: &UploadSettings) -> Result<Self, AppError> {
        if self.tier == UploadTier::Free {
            return Err(AppError::configuration(
                "Upload settings are fixed on the Free tier",
            ));
        }
        settings.validate()?;

        Ok(Self {
            max_concurrent_uploads: settings.max_concurrent_uploads,
            max_concurrent_parts: settings.max_concurrent_parts,
            chunk_size_mb: settings.chunk_size_mb,
            min_chunk_size_mb: settings.min_chunk_size_mb,
            max_chunk_size_mb: settings.max_chunk_size_mb,
            adaptive_chunk_size: settings.adaptive_chunk_size,
            retry_attempts: settings.retry_attempts,
            bandwidth_limit_mbps: settings.bandwidth_limit_mbps,
            ..self.clone()
        })
    }

    /// Settings currently in effect, as an editable form.
    pub fn settings(&self) -> UploadSettings {
        UploadSettings {
            max_concurrent_uploads: self.max_concurrent_uploads,
            max_concurrent_parts: self.max_concurrent_parts,
            chunk_size_mb: self.chunk_size_mb,
            min_chunk_size_mb: self.min_chunk_size_mb,
            max_chunk_size_mb: self.max_chunk_size_mb,
            adaptive_chunk_size: self.adaptive_chunk_size,
            retry_attempts: self.retry_attempts,
            bandwidth_limit_mbps: self.bandwidth_limit_mbps,
        }
    }
}

/// Premium tunables that a user may edit.
#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_settings_consistency"))]
pub struct UploadSettings {
    /// Files transferred at the same time.
    #[validate(range(min = 1, max = 8))]
    pub max_concurrent_uploads: usize,
    /// Parts of one file transferred at the same time.
    #[validate(range(min = 1, max = 8))]
    pub max_concurrent_parts: usize,
    /// Default chunk size in MB.
    #[validate(range(min = 5, max = 1024))]
    pub chunk_size_mb: u64,
    /// Lower chunk size bound in MB.
    #[validate(range(min = 5, max = 1024))]
    pub min_chunk_size_mb: u64,
    /// Upper chunk size bound in MB.
    #[validate(range(min = 5, max = 1024))]
    pub max_chunk_size_mb: u64,
    /// Whether chunk size adapts to throughput.
    pub adaptive_chunk_size: bool,
    /// Attempts per item.
    #[validate(range(min = 0, max = 10))]
    pub retry_attempts: u32,
    /// Optional bandwidth cap in MB/s.
    pub bandwidth_limit_mbps: Option<f64>,
}

fn validate_settings_consistency(settings: &UploadSettings) -> Result<(), ValidationError> {
    if settings.min_chunk_size_mb > settings.max_chunk_size_mb
        || settings.chunk_size_mb < settings.min_chunk_size_mb
        || settings.chunk_size_mb > settings.max_chunk_size_mb
    {
        return Err(ValidationError::new("chunk_size_bounds"));
    }
    if let Some(limit) = settings.bandwidth_limit_mbps {
        if !limit.is_finite() || limit <= 0.0 {
            return Err(ValidationError::new("bandwidth_limit"));
        }
    }
    Ok(())
}

/// Per-tier caps enforced before anything is sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// Maximum total bytes of one file selection; `None` is unlimited.
    pub max_selection_bytes: Option<u64>,
}

impl TierLimits {
    /// Limits for `tier` given the configured caps.
    pub fn for_tier(tier: UploadTier, free_cap: u64, premium_cap: Option<u64>) -> Self {
        match tier {
            UploadTier::Free => Self {
                max_selection_bytes: Some(free_cap),
            },
            UploadTier::Premium => Self {
                max_selection_bytes: premium_cap,
            },
        }
    }

    /// Reject a selection whose total size exceeds the cap.
    pub fn check_selection(&self, total_size: u64) -> Result<(), AppError> {
        match self.max_selection_bytes {
            Some(cap) if total_size > cap => Err(AppError::validation(format!(
                "Selected files total {total_size} bytes, exceeding the tier limit of {cap} bytes"
            ))),
            _ => Ok(()),
        }
    }
}

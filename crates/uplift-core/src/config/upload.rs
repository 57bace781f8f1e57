//! Upload queue configuration.

use serde::{Deserialize, Serialize};

use crate::tier::UploadTier;
use crate::types::key::S3KeyConfig;

/// Settings that shape how the reconciliation engine and the loopback
/// bridge behave at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRuntimeConfig {
    /// Tier selected at startup.
    #[serde(default = "default_tier")]
    pub default_tier: UploadTier,
    /// Target S3 bucket.
    #[serde(default)]
    pub bucket: String,
    /// Key prefix for uploaded objects.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Whether to insert a `YYYY/MM/DD` folder into generated keys.
    #[serde(default)]
    pub use_date_folder: bool,
    /// Whether to keep the source directory (relative to `$HOME`) in keys.
    #[serde(default)]
    pub preserve_directory_structure: bool,
    /// Optional naming pattern with `{filename}`, `{timestamp}`, `{uuid}`.
    #[serde(default)]
    pub naming_pattern: Option<String>,
    /// Interval in milliseconds between queue snapshot polls while idle.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Capacity of the progress event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Maximum total bytes of one file selection on the Free tier.
    #[serde(default = "default_free_max_selection")]
    pub free_max_selection_bytes: u64,
    /// Maximum total bytes of one file selection on the Premium tier.
    /// `None` means unlimited.
    #[serde(default)]
    pub premium_max_selection_bytes: Option<u64>,
    /// Tick length of the loopback transfer driver in milliseconds.
    #[serde(default = "default_simulated_tick")]
    pub simulated_tick_ms: u64,
}

impl UploadRuntimeConfig {
    /// Key generation settings derived from this configuration.
    pub fn key_config(&self) -> S3KeyConfig {
        S3KeyConfig {
            prefix: Some(self.key_prefix.clone()),
            use_date_folder: self.use_date_folder,
            preserve_directory_structure: self.preserve_directory_structure,
            custom_naming_pattern: self.naming_pattern.clone(),
        }
    }
}

impl Default for UploadRuntimeConfig {
    fn default() -> Self {
        Self {
            default_tier: default_tier(),
            bucket: String::new(),
            key_prefix: default_key_prefix(),
            use_date_folder: false,
            preserve_directory_structure: false,
            naming_pattern: None,
            poll_interval_ms: default_poll_interval(),
            event_buffer: default_event_buffer(),
            free_max_selection_bytes: default_free_max_selection(),
            premium_max_selection_bytes: None,
            simulated_tick_ms: default_simulated_tick(),
        }
    }
}

fn default_tier() -> UploadTier {
    UploadTier::Free
}

fn default_key_prefix() -> String {
    "uploads".to_string()
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_event_buffer() -> usize {
    256
}

fn default_free_max_selection() -> u64 {
    5_368_709_120 // 5 GiB
}

fn default_simulated_tick() -> u64 {
    200
}

//! Runtime configuration schemas.
//!
//! The configuration is deserialized via the `config` crate from an
//! optional TOML file overlaid with `UPLIFT__`-prefixed environment
//! variables. Each sub-module represents a logical configuration section.

pub mod logging;
pub mod upload;

use serde::{Deserialize, Serialize};

use self::logging::LoggingConfig;
use self::upload::UploadRuntimeConfig;

use crate::error::AppError;
use crate::types::credentials::AwsCredentials;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Upload queue settings.
    #[serde(default)]
    pub upload: UploadRuntimeConfig,
    /// AWS credentials used to resolve the active upload configuration.
    #[serde(default)]
    pub credentials: AwsCredentials,
}

impl AppConfig {
    /// Load configuration from a TOML file and the environment.
    ///
    /// The file is optional; missing sections fall back to their serde
    /// defaults. Environment variables use the `UPLIFT` prefix and `__`
    /// as the section separator (e.g. `UPLIFT__UPLOAD__BUCKET`).
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("UPLIFT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Merge an overlay configuration on top of this one.
    ///
    /// Non-empty credential fields and the whole logging/upload sections
    /// of the overlay win.
    pub fn merge(&mut self, overlay: AppConfig) {
        self.logging = overlay.logging;
        self.upload = overlay.upload;
        if !overlay.credentials.access_key_id.is_empty() {
            self.credentials.access_key_id = overlay.credentials.access_key_id;
        }
        if !overlay.credentials.secret_access_key.is_empty() {
            self.credentials.secret_access_key = overlay.credentials.secret_access_key;
        }
        if !overlay.credentials.region.is_empty() {
            self.credentials.region = overlay.credentials.region;
        }
        if overlay.credentials.session_token.is_some() {
            self.credentials.session_token = overlay.credentials.session_token;
        }
    }
}

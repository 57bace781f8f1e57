//! AWS credentials carried inside an upload configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Static AWS credentials for the target account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsCredentials {
    /// Access key ID.
    #[serde(default)]
    pub access_key_id: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_access_key: String,
    /// AWS region of the bucket.
    #[serde(default = "default_region")]
    pub region: String,
    /// Optional STS session token.
    #[serde(default)]
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Check that every field required to talk to S3 is present.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.access_key_id.trim().is_empty() {
            return Err(AppError::configuration("AWS access key ID is not set"));
        }
        if self.secret_access_key.trim().is_empty() {
            return Err(AppError::configuration("AWS secret access key is not set"));
        }
        if self.region.trim().is_empty() {
            return Err(AppError::configuration("AWS region is not set"));
        }
        Ok(())
    }
}

impl Default for AwsCredentials {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: default_region(),
            session_token: None,
        }
    }
}

// Secrets never reach the logs.
impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("region", &self.region)
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

//! Object key generation settings.

use serde::{Deserialize, Serialize};

/// How the backend derives an S3 key for each submitted file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3KeyConfig {
    /// Leading key prefix; a trailing `/` is ignored.
    pub prefix: Option<String>,
    /// Insert a `YYYY/MM/DD` folder (UTC).
    pub use_date_folder: bool,
    /// Keep the source directory relative to the home directory.
    pub preserve_directory_structure: bool,
    /// Pattern for the final segment with `{filename}`, `{timestamp}`
    /// and `{uuid}` placeholders.
    pub custom_naming_pattern: Option<String>,
}

//! Result of a file picker interaction.

use serde::{Deserialize, Serialize};

/// Files chosen by the user, with their combined size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSelection {
    /// Absolute paths of the selected files.
    pub paths: Vec<String>,
    /// Sum of the file sizes in bytes.
    pub total_size: u64,
    /// Number of selected files.
    pub count: u32,
}

impl FileSelection {
    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

//! File selection for the loopback backend.
//!
//! There is no dialog in-process, so the picker resolves a list of
//! candidate paths seeded by the host (the CLI arguments, or a test).

use std::path::PathBuf;

use uplift_core::types::FileSelection;

/// Resolves picker requests against a fixed candidate list.
#[derive(Debug, Clone, Default)]
pub struct CandidatePicker {
    candidates: Vec<PathBuf>,
}

impl CandidatePicker {
    /// Create a picker over `candidates`.
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// Pick existing files matching `filter`.
    ///
    /// `filter` is a comma separated extension list such as `"mp4,mov"`
    /// or `"*.mp4"`; matching is case-insensitive. In single mode only the
    /// first match is returned.
    pub fn pick(&self, multiple: bool, filter: Option<&str>) -> FileSelection {
        let extensions: Vec<String> = filter
            .map(|f| {
                f.split(',')
                    .map(|e| e.trim().trim_start_matches('*').trim_start_matches('.').to_ascii_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let mut selection = FileSelection::default();
        for path in &self.candidates {
            let Ok(metadata) = std::fs::metadata(path) else {
                tracing::debug!(path = %path.display(), "Picker candidate not readable");
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            if !extensions.is_empty() {
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase)
                    .unwrap_or_default();
                if !extensions.contains(&ext) {
                    continue;
                }
            }

            selection.paths.push(path.to_string_lossy().to_string());
            selection.total_size += metadata.len();
            if !multiple {
                break;
            }
        }
        selection.count = selection.paths.len() as u32;

        tracing::info!(
            files = selection.count,
            total_size = selection.total_size,
            "File picker resolved"
        );
        selection
    }
}

//! Object key generation for queued files.

use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use uplift_core::error::AppError;
use uplift_core::result::AppResult;
use uplift_core::types::S3KeyConfig;

/// Build the S3 key for `file_path`.
///
/// Segments are joined with `/` in this order: prefix, date folder,
/// home-relative parent directory, final name.
pub fn generate_s3_key(file_path: &str, config: &S3KeyConfig) -> AppResult<String> {
    let path = Path::new(file_path);
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AppError::validation(format!("Invalid file name: {file_path}")))?;

    let mut parts: Vec<String> = Vec::new();

    if let Some(prefix) = &config.prefix {
        let clean = prefix.trim_end_matches('/');
        if !clean.is_empty() {
            parts.push(clean.to_string());
        }
    }

    if config.use_date_folder {
        parts.push(Utc::now().format("%Y/%m/%d").to_string());
    }

    if config.preserve_directory_structure {
        if let Some(relative_parent) = home_relative_parent(path) {
            parts.push(relative_parent);
        }
    }

    let final_name = match &config.custom_naming_pattern {
        Some(pattern) => pattern
            .replace("{filename}", file_name)
            .replace("{timestamp}", &Utc::now().timestamp().to_string())
            .replace("{uuid}", &Uuid::new_v4().to_string()),
        None => file_name.to_string(),
    };
    parts.push(final_name);

    Ok(parts.join("/"))
}

fn home_relative_parent(path: &Path) -> Option<String> {
    let home = dirs::home_dir()?;
    let relative = path.strip_prefix(&home).ok()?;
    let parent = relative.parent()?;
    let segments: Vec<&str> = parent
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

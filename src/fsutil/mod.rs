//! File helpers for exports and imports

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

static INVALID_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid regex"));
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static DOT_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.+").expect("valid regex"));

const MAX_FILENAME_LEN: usize = 200;

fn with_extra_extension(path: &Path, extra: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(extra);
    path.with_file_name(name)
}

/// Write `value` as pretty JSON through a temporary file, optionally keeping a
/// timestamped backup of the previous file. Returns the backup path if one was made.
pub fn safe_write_json<T: Serialize>(path: &Path, value: &T, backup: bool) -> Result<Option<PathBuf>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let backup_path = if backup && path.exists() {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let backup_path = with_extra_extension(path, &format!(".{}.bak", stamp));
        fs::copy(path, &backup_path)
            .with_context(|| format!("Failed to back up {}", path.display()))?;
        Some(backup_path)
    } else {
        None
    };

    let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    let temp_path = with_extra_extension(path, ".tmp");
    if let Err(e) = fs::write(&temp_path, content) {
        let _ = fs::remove_file(&temp_path);
        return Err(e).with_context(|| format!("Failed to write {}", temp_path.display()));
    }
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to move {} into place", temp_path.display()))?;

    Ok(backup_path)
}

/// Read and parse a JSON file; missing files yield None
pub fn safe_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Human-readable file size with one decimal
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Make a string safe to use as a file name
pub fn clean_filename(filename: &str) -> String {
    let cleaned = INVALID_FILENAME_CHARS.replace_all(filename, "_");
    let cleaned = WHITESPACE_RUNS.replace_all(cleaned.trim(), " ");
    let cleaned = DOT_RUNS.replace_all(&cleaned, ".").into_owned();

    if cleaned.chars().count() <= MAX_FILENAME_LEN {
        return cleaned;
    }

    let (stem, ext) = match cleaned.rfind('.') {
        Some(idx) if idx > 0 => cleaned.split_at(idx),
        _ => (cleaned.as_str(), ""),
    };
    let keep = MAX_FILENAME_LEN.saturating_sub(ext.chars().count());
    let stem: String = stem.chars().take(keep).collect();
    format!("{}{}", stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/out.json");
        let backup = safe_write_json(&path, &json!({"a": 1}), true).unwrap();
        assert!(backup.is_none());

        let value: serde_json::Value = safe_read_json(&path).unwrap().unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert!(!temp.path().join("nested/out.json.tmp").exists());
    }

    #[test]
    fn test_backup_keeps_previous_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.json");
        safe_write_json(&path, &json!([1]), false).unwrap();
        let backup = safe_write_json(&path, &json!([2]), true).unwrap().unwrap();

        let old: serde_json::Value = safe_read_json(&backup).unwrap().unwrap();
        assert_eq!(old, json!([1]));
        assert!(backup.to_string_lossy().ends_with(".bak"));
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let temp = TempDir::new().unwrap();
        let value: Option<serde_json::Value> = safe_read_json(&temp.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(500), "500.0 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5.0 GB");
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("  my: report?  v1..json "), "my_ report_ v1.json");
        assert_eq!(clean_filename("a/b\\c"), "a_b_c");

        let long = format!("{}.json", "x".repeat(300));
        let cleaned = clean_filename(&long);
        assert_eq!(cleaned.len(), 200);
        assert!(cleaned.ends_with(".json"));
    }
}

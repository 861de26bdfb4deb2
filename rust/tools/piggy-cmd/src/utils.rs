//! Common utilities for piggy-cmd

use anyhow::{Context, Result};
use piggy_index::IndexWriterConfig;
use std::path::Path;

/// Checks if a file exists and is readable
pub fn validate_file_exists(path: &str) -> Result<()> {
    let file_path = Path::new(path);
    if !file_path.exists() {
        anyhow::bail!("File does not exist: {}", path);
    }
    if !file_path.is_file() {
        anyhow::bail!("Path is not a file: {}", path);
    }
    Ok(())
}

/// Loads writer configuration from a JSON file, or the defaults when no path is given.
pub fn load_config(path: Option<&str>) -> Result<IndexWriterConfig> {
    let Some(path) = path else {
        return Ok(IndexWriterConfig::default());
    };
    validate_file_exists(path)?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {path}"))?;
    let config: IndexWriterConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config file: {path}"))?;
    config.validate()?;
    Ok(config)
}

/// Formats file size in human-readable format
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{size} B"),
        _ => format!("{value:.2} {}", UNITS[unit]),
    }
}

//! Persisted map store.
//!
//! Maps are loaded wholesale at the start of a reconciliation pass, mutated
//! in memory, and overwritten wholesale at the end. There is no partial or
//! append persistence, no migrations, and no schema versioning beyond
//! tolerant decoding.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Best-effort load. A missing, unreadable, or corrupt file yields the
/// default (empty) value so callers always get a usable structure.
pub fn load<T: DeserializeOwned + Default>(path: &Path) -> T {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return T::default(),
    };
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            eprintln!(
                "  [WARN] Failed to parse {}: {} (starting from empty)",
                path.display(),
                e
            );
            T::default()
        }
    }
}

/// Overwrite the whole file with pretty-printed JSON, creating parent
/// directories as needed.
pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("Failed to encode map as JSON")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

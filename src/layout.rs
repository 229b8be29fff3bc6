//! On-disk layout of the backup tree.
//!
//! ```text
//! <base>/
//! ├── backup/<userId>/
//! │   ├── data/<packageName>/<date>/{apk,user,user_de,data,obb}.tar[.zst|.lz4]
//! │   └── media/<mediaName>/<date>/<mediaName>.tar[.zst|.lz4]
//! ├── config/
//! │   ├── app_backup_map.json
//! │   ├── app_restore_map.json
//! │   ├── media_backup_map.json
//! │   ├── media_restore_map.json
//! │   └── run_history.json
//! └── operations.log
//! ```
//!
//! The reconciler depends on archive paths having exactly three segments
//! relative to the scan root: `<entityKey>/<date>/<fileName>`.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct Layout {
    base: PathBuf,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Per-user backup tree: `<base>/backup/<userId>`.
    pub fn backup_root(&self, user_id: &str) -> PathBuf {
        self.base.join("backup").join(user_id)
    }

    /// Scan root for app archives.
    pub fn app_data_root(&self, user_id: &str) -> PathBuf {
        self.backup_root(user_id).join("data")
    }

    /// Scan root for media archives.
    pub fn media_root(&self, user_id: &str) -> PathBuf {
        self.backup_root(user_id).join("media")
    }

    /// Directory holding one dated archive set: `<root>/<key>/<date>`.
    pub fn archive_dir(root: &Path, key: &str, date: &str) -> PathBuf {
        root.join(key).join(date)
    }

    /// Directory listed when enumerating backup users.
    pub fn users_root(&self) -> PathBuf {
        self.base.join("backup")
    }

    fn config_dir(&self) -> PathBuf {
        self.base.join("config")
    }

    pub fn app_backup_map(&self) -> PathBuf {
        self.config_dir().join("app_backup_map.json")
    }

    pub fn app_restore_map(&self) -> PathBuf {
        self.config_dir().join("app_restore_map.json")
    }

    pub fn media_backup_map(&self) -> PathBuf {
        self.config_dir().join("media_backup_map.json")
    }

    pub fn media_restore_map(&self) -> PathBuf {
        self.config_dir().join("media_restore_map.json")
    }

    pub fn run_history(&self) -> PathBuf {
        self.config_dir().join("run_history.json")
    }

    pub fn op_log(&self) -> PathBuf {
        self.base.join("operations.log")
    }
}

/// Timestamp key for a new dated archive directory.
///
/// Seconds since the epoch: lexicographic order matches chronological order
/// for the lifetime of this tool, and the token is safe as a path segment.
pub fn timestamp_key() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_paths_have_three_segments_under_root() {
        let layout = Layout::new("/sdcard/rootstash");
        let root = layout.app_data_root("0");
        let dir = Layout::archive_dir(&root, "com.app", "1700000000");
        let rel = dir.strip_prefix(&root).unwrap();
        assert_eq!(rel.iter().count(), 2);
        assert_eq!(rel, Path::new("com.app/1700000000"));
    }

    #[test]
    fn test_map_paths_live_under_config() {
        let layout = Layout::new("/sdcard/rootstash");
        assert!(layout.app_backup_map().starts_with("/sdcard/rootstash/config"));
        assert!(layout.run_history().ends_with("run_history.json"));
    }
}

//! Shared test utilities for rootstash tests.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use rootstash::archive::CompressionType;
use rootstash::config::{BackupStrategy, Config};
use rootstash::oplog::OpLog;
use rootstash::shell::Shell;

/// Test environment with a temporary backup tree and a gateway that runs
/// through a plain `sh` instead of a root binary.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub base: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            base,
        }
    }

    /// A config rooted in the temp tree, tar codec, verification off.
    pub fn config(&self) -> Config {
        Config {
            backup_root: self.base.clone(),
            backup_user: "0".to_string(),
            restore_user: "0".to_string(),
            strategy: BackupStrategy::Overwrite,
            compression: CompressionType::Tar,
            verify_archives: false,
            auto_fix_multiuser_context: false,
            su_binary: "sh".to_string(),
        }
    }

    pub fn shell(&self) -> Shell {
        Shell::new("sh", OpLog::disabled())
    }
}

/// Create a file (and its parents) with a little content.
pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dirs");
    }
    fs::write(path, b"rootstash test data\n").expect("Failed to write file");
}

/// Build absolute, path-sorted listing lines for archive files under a root.
pub fn listing(root: &Path, entries: &[(&str, &str, &str)]) -> Vec<String> {
    let mut lines: Vec<String> = entries
        .iter()
        .map(|(key, date, file)| {
            root.join(key)
                .join(date)
                .join(file)
                .to_string_lossy()
                .to_string()
        })
        .collect();
    lines.sort();
    lines
}

//! Configuration management for rootstash.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::CompressionType;

/// Shared-storage location used when running on a device.
pub const DEVICE_DEFAULT_ROOT: &str = "/storage/emulated/0/rootstash";

/// How repeated backups of the same entity are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStrategy {
    /// Re-running backup overwrites the existing dated archive set and
    /// skips recompression when the source is unchanged.
    Overwrite,
    /// Every run produces a new dated archive set.
    Versioned,
}

impl BackupStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Some(Self::Overwrite),
            "versioned" => Some(Self::Versioned),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Versioned => "versioned",
        }
    }
}

/// Engine configuration, threaded explicitly through the gateway and
/// pipeline constructors.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base of the backup tree.
    pub backup_root: PathBuf,
    /// Android user whose apps and data are backed up.
    pub backup_user: String,
    /// Android user restores are applied to.
    pub restore_user: String,
    pub strategy: BackupStrategy,
    pub compression: CompressionType,
    /// Run the codec's integrity test on every produced archive.
    pub verify_archives: bool,
    /// Rewrite SELinux MLS categories when restoring to a secondary user.
    pub auto_fix_multiuser_context: bool,
    /// Binary used to obtain the root session.
    pub su_binary: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_root: default_backup_root(),
            backup_user: "0".to_string(),
            restore_user: "0".to_string(),
            strategy: BackupStrategy::Overwrite,
            compression: CompressionType::Zstd,
            verify_archives: true,
            auto_fix_multiuser_context: false,
            su_binary: "su".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Self {
        let mut env_vars = HashMap::new();

        // Try to load .env file
        let env_path = base_dir.join(".env");
        if env_path.exists() {
            if let Ok(content) = fs::read_to_string(&env_path) {
                for line in content.lines() {
                    let line = line.trim();
                    // Skip comments and empty lines
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    // Parse KEY=value
                    if let Some((key, value)) = line.split_once('=') {
                        let key = key.trim();
                        let value = value.trim();
                        // Remove quotes if present
                        let value = value.trim_matches('"').trim_matches('\'');
                        env_vars.insert(key.to_string(), value.to_string());
                    }
                }
            }
        }

        // Environment variables override .env file
        for (key, value) in std::env::vars() {
            env_vars.insert(key, value);
        }

        let defaults = Self::default();

        let backup_root = env_vars
            .get("ROOTSTASH_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.backup_root);

        let backup_user = env_vars
            .get("ROOTSTASH_BACKUP_USER")
            .cloned()
            .unwrap_or(defaults.backup_user);

        let restore_user = env_vars
            .get("ROOTSTASH_RESTORE_USER")
            .cloned()
            .unwrap_or(defaults.restore_user);

        let strategy = env_vars
            .get("ROOTSTASH_STRATEGY")
            .and_then(|s| BackupStrategy::parse(s))
            .unwrap_or(defaults.strategy);

        let compression = env_vars
            .get("ROOTSTASH_COMPRESSION")
            .and_then(|s| CompressionType::parse(s))
            .unwrap_or(defaults.compression);

        let verify_archives = env_vars
            .get("ROOTSTASH_VERIFY")
            .map(|v| parse_bool(v))
            .unwrap_or(defaults.verify_archives);

        let auto_fix_multiuser_context = env_vars
            .get("ROOTSTASH_AUTO_FIX_CONTEXT")
            .map(|v| parse_bool(v))
            .unwrap_or(defaults.auto_fix_multiuser_context);

        let su_binary = env_vars
            .get("ROOTSTASH_SU")
            .cloned()
            .unwrap_or(defaults.su_binary);

        Self {
            backup_root,
            backup_user,
            restore_user,
            strategy,
            compression,
            verify_archives,
            auto_fix_multiuser_context,
            su_binary,
        }
    }

    /// Print configuration for the `show config` command.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  ROOTSTASH_ROOT: {}", self.backup_root.display());
        println!("  ROOTSTASH_BACKUP_USER: {}", self.backup_user);
        println!("  ROOTSTASH_RESTORE_USER: {}", self.restore_user);
        println!("  ROOTSTASH_STRATEGY: {}", self.strategy.as_str());
        println!("  ROOTSTASH_COMPRESSION: {}", self.compression.as_str());
        println!("  ROOTSTASH_VERIFY: {}", self.verify_archives);
        println!(
            "  ROOTSTASH_AUTO_FIX_CONTEXT: {}",
            self.auto_fix_multiuser_context
        );
        println!("  ROOTSTASH_SU: {}", self.su_binary);
    }
}

fn parse_bool(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

fn default_backup_root() -> PathBuf {
    // Shared storage on a device, home directory elsewhere.
    if Path::new("/storage/emulated/0").is_dir() {
        PathBuf::from(DEVICE_DEFAULT_ROOT)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rootstash")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            BackupStrategy::parse("overwrite"),
            Some(BackupStrategy::Overwrite)
        );
        assert_eq!(
            BackupStrategy::parse("Versioned"),
            Some(BackupStrategy::Versioned)
        );
        assert_eq!(BackupStrategy::parse("cover"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("no"));
    }

    #[test]
    #[serial]
    fn test_env_overrides_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".env"),
            "ROOTSTASH_BACKUP_USER=10\nROOTSTASH_STRATEGY=versioned\n",
        )
        .unwrap();

        std::env::set_var("ROOTSTASH_BACKUP_USER", "11");
        let config = Config::load(dir.path());
        std::env::remove_var("ROOTSTASH_BACKUP_USER");

        assert_eq!(config.backup_user, "11");
        assert_eq!(config.strategy, BackupStrategy::Versioned);
    }

    #[test]
    #[serial]
    fn test_dotenv_quotes_stripped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "ROOTSTASH_SU=\"/system/xbin/su\"\n").unwrap();

        let config = Config::load(dir.path());
        assert_eq!(config.su_binary, "/system/xbin/su");
    }
}

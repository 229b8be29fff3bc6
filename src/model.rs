//! Entity records tracked by the engine.
//!
//! An entity is either an app (keyed by package name) or a medium (keyed by
//! directory name). Each carries a base descriptor plus two independent state
//! lists: a single backup descriptor for the *next* backup, and an ordered
//! list of historical restore points, one per backup date.
//!
//! All maps serialize as JSON with tolerant decoding: unknown fields are
//! ignored, missing fields default to empty strings / false. `BTreeMap`
//! keeps serialization order stable so re-saving unchanged state is
//! byte-identical.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder label for an entity found on disk but no longer installed.
pub const RETRIEVED_LABEL: &str = "[retrieved from archive]";

/// Identity shared by the backup and restore sides of an app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppBase {
    pub package_name: String,
    pub app_name: String,
    pub system_app: bool,
    pub first_install_time: String,
    /// True when the package is currently installed for the configured user.
    pub on_device: bool,
}

/// What the next backup of an app would contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppBackupDetail {
    pub version_name: String,
    pub version_code: i64,
    pub date: String,
    /// Size fingerprints captured at the time of the last archive, one per
    /// data category. Compared for equality to decide incremental skips.
    pub apk_size: String,
    pub user_size: String,
    pub user_de_size: String,
    pub data_size: String,
    pub obb_size: String,
    pub select_app: bool,
    pub select_data: bool,
}

/// One historical restore point of an app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppRestoreDetail {
    pub date: String,
    pub version_name: String,
    pub version_code: i64,
    pub has_app: bool,
    pub has_data: bool,
    pub select_app: bool,
    pub select_data: bool,
    pub app_size: String,
    pub data_size: String,
}

impl AppRestoreDetail {
    /// A restore point first observed on disk: everything found is present
    /// and selected until evidence says otherwise.
    pub fn fresh(date: &str) -> Self {
        Self {
            date: date.to_string(),
            has_app: true,
            has_data: true,
            select_app: true,
            select_data: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppBackupRecord {
    pub base: AppBase,
    pub backup: AppBackupDetail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppRestoreRecord {
    pub base: AppBase,
    pub restore_list: Vec<AppRestoreDetail>,
}

impl AppRestoreRecord {
    /// Record for an app that only exists in the archive.
    pub fn retrieved(package_name: &str) -> Self {
        Self {
            base: AppBase {
                package_name: package_name.to_string(),
                app_name: RETRIEVED_LABEL.to_string(),
                on_device: false,
                ..AppBase::default()
            },
            restore_list: Vec::new(),
        }
    }
}

/// Backup descriptor of a medium (an opaque directory tree).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaBackupDetail {
    pub date: String,
    pub size: String,
    pub select_data: bool,
}

/// One historical restore point of a medium.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaRestoreDetail {
    pub date: String,
    pub has_data: bool,
    pub select_data: bool,
    pub size: String,
}

impl MediaRestoreDetail {
    pub fn fresh(date: &str) -> Self {
        Self {
            date: date.to_string(),
            has_data: true,
            select_data: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaBackupRecord {
    pub name: String,
    pub path: String,
    pub backup: MediaBackupDetail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaRestoreRecord {
    pub name: String,
    pub path: String,
    pub restore_list: Vec<MediaRestoreDetail>,
}

/// One completed backup or restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunRecord {
    pub date: String,
    pub mode: String,
    pub user_id: String,
    pub total: usize,
    pub succeeded: usize,
}

pub type AppBackupMap = BTreeMap<String, AppBackupRecord>;
pub type AppRestoreMap = BTreeMap<String, AppRestoreRecord>;
pub type MediaBackupMap = BTreeMap<String, MediaBackupRecord>;
pub type MediaRestoreMap = BTreeMap<String, MediaRestoreRecord>;
pub type RunHistory = Vec<RunRecord>;

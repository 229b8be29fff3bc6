//! Engine facade: loads a persisted map, gathers fresh evidence (disk
//! listing, installed packages), runs the reconciler, and persists the
//! result. One call is one reconciliation pass.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::layout::Layout;
use crate::model::{AppBackupMap, AppRestoreMap, MediaBackupMap, MediaRestoreMap, RunHistory, RunRecord};
use crate::pm::{PackageMeta, PackageRegistry};
use crate::reconcile;
use crate::shell::Shell;
use crate::store;

/// Companion app package of this engine; it is never offered for backup.
const SELF_PACKAGE: &str = "dev.rootstash.app";

pub struct Engine<'a> {
    shell: &'a Shell,
    config: &'a Config,
    layout: Layout,
}

impl<'a> Engine<'a> {
    pub fn new(shell: &'a Shell, config: &'a Config) -> Self {
        let layout = Layout::new(&config.backup_root);
        Self {
            shell,
            config,
            layout,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Fail fast when the privileged session is unusable. No other
    /// operation is attempted without it.
    pub async fn require_root(&self) -> Result<()> {
        if !self.shell.check_root_access().await {
            bail!(
                "No root access via '{}'. A working root session is required.",
                self.config.su_binary
            );
        }
        Ok(())
    }

    /// Rebuild the app backup map from the persisted snapshot and the live
    /// package manager.
    pub async fn reconcile_backup_map(&self) -> AppBackupMap {
        let path = self.layout.app_backup_map();
        let mut map: AppBackupMap = store::load(&path);
        let metas = self.installed_metas(&self.config.backup_user).await;
        reconcile::apply_installed_packages_backup(&mut map, &metas);
        if let Err(e) = store::save(&path, &map) {
            eprintln!("  [WARN] {:#}", e);
        }
        map
    }

    /// Rebuild the app restore map from the persisted snapshot, the backup
    /// root scan, and the live package manager.
    pub async fn reconcile_restore_map(&self) -> AppRestoreMap {
        let path = self.layout.app_restore_map();
        let root = self.layout.app_data_root(&self.config.backup_user);
        let listing = self.sorted_listing(&root.to_string_lossy()).await;

        let map: AppRestoreMap = store::load(&path);
        let mut map = reconcile::reconcile_app_restore(map, &root, &listing);

        let metas = self.installed_metas(&self.config.backup_user).await;
        reconcile::apply_installed_packages_restore(&mut map, &metas);

        if let Err(e) = store::save(&path, &map) {
            eprintln!("  [WARN] {:#}", e);
        }
        map
    }

    /// Rebuild the media backup map, seeding the conventional directories
    /// into an empty map.
    pub async fn reconcile_media_backup_map(&self) -> MediaBackupMap {
        let path = self.layout.media_backup_map();
        let mut map: MediaBackupMap = store::load(&path);
        reconcile::seed_default_media(&mut map);
        if let Err(e) = store::save(&path, &map) {
            eprintln!("  [WARN] {:#}", e);
        }
        map
    }

    /// Rebuild the media restore map from the media root scan.
    pub async fn reconcile_media_restore_map(&self) -> MediaRestoreMap {
        let path = self.layout.media_restore_map();
        let root = self.layout.media_root(&self.config.backup_user);
        let listing = self.sorted_listing(&root.to_string_lossy()).await;

        let map: MediaRestoreMap = store::load(&path);
        let map = reconcile::reconcile_media_restore(map, &root, &listing);

        if let Err(e) = store::save(&path, &map) {
            eprintln!("  [WARN] {:#}", e);
        }
        map
    }

    /// Users that have a backup tree on disk.
    pub async fn list_backup_users(&self) -> Vec<String> {
        let root = self.layout.users_root();
        let result = self
            .shell
            .execute(&format!("ls \"{}\"", root.to_string_lossy()))
            .await;
        if !result.success {
            return Vec::new();
        }
        result
            .out
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .collect()
    }

    /// Append one run record to the persisted history.
    pub fn record_run(&self, record: RunRecord) {
        let path = self.layout.run_history();
        let mut history: RunHistory = store::load(&path);
        history.push(record);
        if let Err(e) = store::save(&path, &history) {
            eprintln!("  [WARN] {:#}", e);
        }
    }

    /// Flat recursive file listing of `root`, path-sorted as the
    /// reconciler's grouping requires. A failed listing (missing root,
    /// revoked access) reconciles as an empty tree.
    async fn sorted_listing(&self, root: &str) -> Vec<String> {
        let result = self
            .shell
            .execute(&format!(
                "find \"{}\" -type f 2>/dev/null | LC_ALL=C sort",
                root
            ))
            .await;
        result.out
    }

    /// Base descriptors of every installed package of the user, this
    /// engine's own companion app excluded.
    async fn installed_metas(&self, user_id: &str) -> Vec<PackageMeta> {
        let registry = PackageRegistry::new(self.shell);
        let mut metas = Vec::new();
        for package in registry.list_packages(user_id).await {
            if package == SELF_PACKAGE {
                continue;
            }
            if let Some(meta) = registry.dumpsys(user_id, &package).await {
                metas.push(meta);
            }
        }
        metas
    }
}

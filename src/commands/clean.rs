//! Clean command - the only way entity records are ever removed.
//!
//! Reconciliation never deletes an entity; clearing is an explicit,
//! user-driven operation. Clearing an app also removes its backup-root
//! subtree, so the next reconciliation pass cannot resurrect it.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::engine::Engine;
use crate::model::{AppBackupMap, AppRestoreMap, MediaBackupMap, MediaRestoreMap};
use crate::shell::Shell;
use crate::store;

/// Clean target for the clean command.
pub enum CleanTarget {
    /// Remove one app from both maps and delete its archives.
    App { package: String },
    /// Remove one medium from both maps and delete its archives.
    Media { name: String },
    /// Delete the persisted maps and run history, keep archives.
    Maps,
    /// Delete the entire backup tree.
    All,
}

/// Execute the clean command.
pub async fn cmd_clean(shell: &Shell, config: &Config, target: CleanTarget) -> Result<()> {
    let engine = Engine::new(shell, config);
    engine.require_root().await?;
    let layout = engine.layout();

    match target {
        CleanTarget::App { package } => {
            let backup_path = layout.app_backup_map();
            let mut backup: AppBackupMap = store::load(&backup_path);
            let restore_path = layout.app_restore_map();
            let mut restore: AppRestoreMap = store::load(&restore_path);

            if backup.remove(&package).is_none() && restore.remove(&package).is_none() {
                bail!("{} is not tracked by any map", package);
            }
            store::save(&backup_path, &backup)?;
            store::save(&restore_path, &restore)?;

            let subtree = layout
                .app_data_root(&config.backup_user)
                .join(&package);
            shell.rm_rf(&subtree.to_string_lossy()).await;
            println!("Cleared {} and removed {}", package, subtree.display());
        }

        CleanTarget::Media { name } => {
            let backup_path = layout.media_backup_map();
            let mut backup: MediaBackupMap = store::load(&backup_path);
            let restore_path = layout.media_restore_map();
            let mut restore: MediaRestoreMap = store::load(&restore_path);

            if backup.remove(&name).is_none() && restore.remove(&name).is_none() {
                bail!("{} is not tracked by any map", name);
            }
            store::save(&backup_path, &backup)?;
            store::save(&restore_path, &restore)?;

            let subtree = layout.media_root(&config.backup_user).join(&name);
            shell.rm_rf(&subtree.to_string_lossy()).await;
            println!("Cleared {} and removed {}", name, subtree.display());
        }

        CleanTarget::Maps => {
            for path in [
                layout.app_backup_map(),
                layout.app_restore_map(),
                layout.media_backup_map(),
                layout.media_restore_map(),
                layout.run_history(),
            ] {
                shell.rm_rf(&path.to_string_lossy()).await;
            }
            println!("Removed persisted maps and run history.");
        }

        CleanTarget::All => {
            let base = layout.base().to_string_lossy().to_string();
            if !shell.rm_rf(&base).await {
                bail!("Failed to remove {}", base);
            }
            println!("Removed {}", base);
        }
    }
    Ok(())
}

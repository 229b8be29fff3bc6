//! Show command - displays configuration, persisted maps and run history.
//!
//! Maps are printed as persisted, without triggering a reconciliation pass,
//! so `show` works without root (except `users`, which lists the on-disk
//! backup tree through the shell).

use anyhow::Result;

use crate::config::Config;
use crate::engine::Engine;
use crate::layout::Layout;
use crate::model::{
    AppBackupMap, AppRestoreMap, MediaBackupMap, MediaRestoreMap, RunHistory,
};
use crate::shell::Shell;
use crate::store;

/// Show target for the show command.
pub enum ShowTarget {
    Config,
    Backup,
    Restore,
    MediaBackup,
    MediaRestore,
    History,
    Users,
}

/// Execute the show command.
pub async fn cmd_show(shell: &Shell, config: &Config, target: ShowTarget) -> Result<()> {
    let layout = Layout::new(&config.backup_root);

    match target {
        ShowTarget::Config => {
            config.print();
        }

        ShowTarget::Backup => {
            let map: AppBackupMap = store::load(&layout.app_backup_map());
            println!("App backup map ({} entries):", map.len());
            for (key, record) in &map {
                println!(
                    "  {} [{}] version {} last backup {}",
                    key,
                    if record.base.on_device { "installed" } else { "archive only" },
                    record.backup.version_code,
                    if record.backup.date.is_empty() { "-" } else { record.backup.date.as_str() },
                );
            }
        }

        ShowTarget::Restore => {
            let map: AppRestoreMap = store::load(&layout.app_restore_map());
            println!("App restore map ({} entries):", map.len());
            for (key, record) in &map {
                println!(
                    "  {} [{}]",
                    key,
                    if record.base.on_device { "installed" } else { "archive only" },
                );
                for detail in &record.restore_list {
                    println!(
                        "    {} app={} data={}",
                        detail.date, detail.has_app, detail.has_data
                    );
                }
            }
        }

        ShowTarget::MediaBackup => {
            let map: MediaBackupMap = store::load(&layout.media_backup_map());
            println!("Media backup map ({} entries):", map.len());
            for (key, record) in &map {
                println!(
                    "  {} <- {} last backup {}",
                    key,
                    record.path,
                    if record.backup.date.is_empty() { "-" } else { record.backup.date.as_str() },
                );
            }
        }

        ShowTarget::MediaRestore => {
            let map: MediaRestoreMap = store::load(&layout.media_restore_map());
            println!("Media restore map ({} entries):", map.len());
            for (key, record) in &map {
                println!("  {}", key);
                for detail in &record.restore_list {
                    println!("    {} data={}", detail.date, detail.has_data);
                }
            }
        }

        ShowTarget::History => {
            let history: RunHistory = store::load(&layout.run_history());
            println!("Run history ({} runs):", history.len());
            for run in &history {
                println!(
                    "  {} {} user {} {}/{} succeeded",
                    run.date, run.mode, run.user_id, run.succeeded, run.total
                );
            }
        }

        ShowTarget::Users => {
            let engine = Engine::new(shell, config);
            let users = engine.list_backup_users().await;
            if users.is_empty() {
                println!("No backup users found under {}", layout.users_root().display());
            } else {
                println!("Backup users:");
                for user in users {
                    println!("  {}", user);
                }
            }
        }
    }
    Ok(())
}

//! Backup command - archives apps, media, or this tool itself.
//!
//! Each entity's pipeline runs and is reconciled independently: a failure
//! aborts the remaining steps for that entity only, never the whole run.

use anyhow::{Context, Result};

use crate::archive::{DataCategory, Pipeline, APP_DATA_CATEGORIES};
use crate::config::{BackupStrategy, Config};
use crate::engine::Engine;
use crate::layout::{self, Layout};
use crate::model::{AppBackupDetail, RunRecord};
use crate::pm::PackageRegistry;
use crate::shell::{ProgressSink, Shell};
use crate::size::{size_of, SizeMode};
use crate::store;

fn none_if_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn stored_fingerprint(detail: &AppBackupDetail, category: DataCategory) -> Option<&str> {
    let token = match category {
        DataCategory::User => &detail.user_size,
        DataCategory::UserDe => &detail.user_de_size,
        DataCategory::Data => &detail.data_size,
        DataCategory::Obb => &detail.obb_size,
        _ => return None,
    };
    none_if_empty(token)
}

/// Capture fresh fingerprints after a backup so the next overwrite run can
/// detect "no change since last archive".
async fn refresh_fingerprints(
    shell: &Shell,
    config: &Config,
    package: &str,
    detail: &mut AppBackupDetail,
) {
    let registry = PackageRegistry::new(shell);
    if let Some(apk_dir) = registry.apk_dir(package, &config.backup_user).await {
        detail.apk_size = size_of(shell, &apk_dir, SizeMode::Occupied).await;
    }
    for category in APP_DATA_CATEGORIES {
        let Some(source_root) = category.source_root(&config.backup_user) else {
            continue;
        };
        let tree = format!("{}/{}", source_root, package);
        let token = if shell.exists(&tree).await {
            size_of(shell, &tree, SizeMode::Occupied).await
        } else {
            "0".to_string()
        };
        match category {
            DataCategory::User => detail.user_size = token,
            DataCategory::UserDe => detail.user_de_size = token,
            DataCategory::Data => detail.data_size = token,
            DataCategory::Obb => detail.obb_size = token,
            _ => {}
        }
    }
}

/// Date key for this run. The overwrite strategy keeps writing into the
/// entity's existing dated directory; versioned runs open a new one.
fn run_date(strategy: BackupStrategy, previous: &str, now: &str) -> String {
    match strategy {
        BackupStrategy::Overwrite if !previous.is_empty() => previous.to_string(),
        _ => now.to_string(),
    }
}

/// Execute `backup apps`. An empty package list means every installed app.
pub async fn cmd_backup_apps(shell: &Shell, config: &Config, packages: Vec<String>) -> Result<()> {
    let engine = Engine::new(shell, config);
    engine.require_root().await?;

    let mut map = engine.reconcile_backup_map().await;
    let targets: Vec<String> = if packages.is_empty() {
        map.iter()
            .filter(|(_, record)| record.base.on_device)
            .map(|(key, _)| key.clone())
            .collect()
    } else {
        packages
    };

    if targets.is_empty() {
        println!("Nothing to back up.");
        return Ok(());
    }

    let root = engine.layout().app_data_root(&config.backup_user);
    let root_str = root.to_string_lossy().to_string();
    shell.mkdir_p(&root_str).await;

    let pipeline = Pipeline::new(shell, config);
    let now = layout::timestamp_key();
    let sink: &ProgressSink = &|line: &str| println!("    {}", line);

    let mut succeeded = 0;
    for package in &targets {
        let Some(previous) = map.get(package).map(|r| r.backup.clone()) else {
            println!("  {}: not installed for user {}, skipping", package, config.backup_user);
            continue;
        };

        let date = run_date(config.strategy, &previous.date, &now);
        let out_dir = Layout::archive_dir(&root, package, &date);
        let out = out_dir.to_string_lossy().to_string();
        println!("Backing up {}", package);

        if !shell.mkdir_p(&out).await {
            println!("  {}: cannot create {}", package, out);
            continue;
        }

        let mut ok = pipeline
            .compress_apk(
                config.compression,
                package,
                &out,
                &config.backup_user,
                none_if_empty(&previous.apk_size),
                Some(sink),
            )
            .await;

        for category in APP_DATA_CATEGORIES {
            let Some(source_root) = category.source_root(&config.backup_user) else {
                continue;
            };
            // An app without this category is not a failure.
            if !shell.exists(&format!("{}/{}", source_root, package)).await {
                continue;
            }
            let done = pipeline
                .compress(
                    config.compression,
                    category,
                    package,
                    &out,
                    &source_root,
                    stored_fingerprint(&previous, category),
                    Some(sink),
                )
                .await;
            ok = done && ok;
        }

        if let Some(record) = map.get_mut(package) {
            record.backup.date = date;
            refresh_fingerprints(shell, config, package, &mut record.backup).await;
        }

        if ok {
            succeeded += 1;
        } else {
            println!("  {}: FAILED", package);
        }
    }

    store::save(&engine.layout().app_backup_map(), &map)
        .context("Failed to persist app backup map")?;
    engine.record_run(RunRecord {
        date: now,
        mode: "backup-apps".to_string(),
        user_id: config.backup_user.clone(),
        total: targets.len(),
        succeeded,
    });

    println!("\nBacked up {}/{} apps.", succeeded, targets.len());
    Ok(())
}

/// Execute `backup media`. An empty name list means every tracked medium.
pub async fn cmd_backup_media(shell: &Shell, config: &Config, names: Vec<String>) -> Result<()> {
    let engine = Engine::new(shell, config);
    engine.require_root().await?;

    let mut map = engine.reconcile_media_backup_map().await;
    let targets: Vec<String> = if names.is_empty() {
        map.keys().cloned().collect()
    } else {
        names
    };

    let root = engine.layout().media_root(&config.backup_user);
    let root_str = root.to_string_lossy().to_string();
    shell.mkdir_p(&root_str).await;

    let pipeline = Pipeline::new(shell, config);
    let now = layout::timestamp_key();
    let sink: &ProgressSink = &|line: &str| println!("    {}", line);

    let mut succeeded = 0;
    for name in &targets {
        let Some(record) = map.get(name).cloned() else {
            println!("  {}: not a tracked medium, skipping", name);
            continue;
        };
        if record.path.is_empty() {
            println!("  {}: no source path recorded, skipping", name);
            continue;
        }

        let date = run_date(config.strategy, &record.backup.date, &now);
        let out_dir = Layout::archive_dir(&root, name, &date);
        let out = out_dir.to_string_lossy().to_string();
        println!("Backing up {} ({})", name, record.path);

        if !shell.mkdir_p(&out).await {
            println!("  {}: cannot create {}", name, out);
            continue;
        }

        let ok = pipeline
            .compress(
                config.compression,
                DataCategory::Media,
                name,
                &out,
                &record.path,
                none_if_empty(&record.backup.size),
                Some(sink),
            )
            .await;

        let fresh = size_of(shell, &record.path, SizeMode::Occupied).await;
        if let Some(entry) = map.get_mut(name) {
            entry.backup.date = date;
            entry.backup.size = fresh;
        }

        if ok {
            succeeded += 1;
        } else {
            println!("  {}: FAILED", name);
        }
    }

    store::save(&engine.layout().media_backup_map(), &map)
        .context("Failed to persist media backup map")?;
    engine.record_run(RunRecord {
        date: now,
        mode: "backup-media".to_string(),
        user_id: config.backup_user.clone(),
        total: targets.len(),
        succeeded,
    });

    println!("\nBacked up {}/{} media directories.", succeeded, targets.len());
    Ok(())
}

/// Execute `backup self`: keep a copy of this binary next to the archives,
/// refreshed only when it changed.
pub async fn cmd_backup_self(shell: &Shell, config: &Config) -> Result<()> {
    let engine = Engine::new(shell, config);
    engine.require_root().await?;

    let exe = std::env::current_exe().context("Cannot resolve own binary path")?;
    let exe_str = exe.to_string_lossy().to_string();

    let dest_dir = engine.layout().base().join("self");
    let dest_dir_str = dest_dir.to_string_lossy().to_string();
    let dest = format!("{}/rootstash.bin", dest_dir_str);

    if !shell.mkdir_p(&dest_dir_str).await {
        anyhow::bail!("Cannot create {}", dest_dir_str);
    }

    let current = size_of(shell, &exe_str, SizeMode::Occupied).await;
    let stored = size_of(shell, &dest, SizeMode::Occupied).await;
    if current != "0" && current == stored {
        println!("Own binary unchanged, skipping.");
        return Ok(());
    }

    if !shell.cp(&exe_str, &dest).await {
        anyhow::bail!("Failed to copy {} to {}", exe_str, dest);
    }
    println!("Copied own binary to {}", dest);
    Ok(())
}

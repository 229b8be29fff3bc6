//! Restore command - reinstalls apps and extracts data archives.
//!
//! Restore always runs when requested; the incremental-skip fast path only
//! exists on the backup side. A failed step skips the remaining steps for
//! that entity and moves on to the next one.

use anyhow::Result;

use crate::archive::{CompressionType, DataCategory, Pipeline, APP_DATA_CATEGORIES};
use crate::config::Config;
use crate::engine::Engine;
use crate::layout::{self, Layout};
use crate::model::RunRecord;
use crate::shell::{ProgressSink, Shell};

/// Sniff the codec from the archive files already present in a dated
/// directory, falling back to the configured codec for empty directories.
async fn detect_codec(shell: &Shell, dir: &str) -> Option<CompressionType> {
    let result = shell.execute(&format!("ls \"{}\"", dir)).await;
    if !result.success {
        return None;
    }
    result
        .out
        .iter()
        .find_map(|line| CompressionType::from_archive_path(line.trim()))
}

/// Execute `restore apps --date <date> [packages...]`.
///
/// An empty package list restores every entity that has a selected restore
/// point at that date.
pub async fn cmd_restore_apps(
    shell: &Shell,
    config: &Config,
    date: String,
    packages: Vec<String>,
) -> Result<()> {
    let engine = Engine::new(shell, config);
    engine.require_root().await?;

    let map = engine.reconcile_restore_map().await;
    let targets: Vec<String> = if packages.is_empty() {
        map.iter()
            .filter(|(_, record)| {
                record
                    .restore_list
                    .iter()
                    .any(|d| d.date == date && (d.select_app || d.select_data))
            })
            .map(|(key, _)| key.clone())
            .collect()
    } else {
        packages
    };

    if targets.is_empty() {
        println!("Nothing to restore for date {}.", date);
        return Ok(());
    }

    let root = engine.layout().app_data_root(&config.backup_user);
    let pipeline = Pipeline::new(shell, config);
    let sink: &ProgressSink = &|line: &str| println!("    {}", line);

    let mut succeeded = 0;
    for package in &targets {
        let Some(record) = map.get(package) else {
            println!("  {}: not in restore map, skipping", package);
            continue;
        };
        let Some(detail) = record.restore_list.iter().find(|d| d.date == date) else {
            println!("  {}: no restore point at {}, skipping", package, date);
            continue;
        };

        let dir = Layout::archive_dir(&root, package, &date);
        let dir_str = dir.to_string_lossy().to_string();
        let kind = detect_codec(shell, &dir_str)
            .await
            .unwrap_or(config.compression);

        println!("Restoring {} from {}", package, date);
        let mut ok = true;

        if detail.has_app && detail.select_app {
            let apk_archive = format!("{}/apk.{}", dir_str, kind.suffix());
            let staging = format!("/data/local/tmp/rootstash-apk-{}", package);
            ok = pipeline
                .decompress(kind, &apk_archive, &staging, Some(sink))
                .await;
            if ok {
                ok = pipeline
                    .install_apk(
                        &staging,
                        package,
                        &config.restore_user,
                        detail.version_code,
                        Some(sink),
                    )
                    .await;
            }
            shell.rm_rf(&staging).await;
        }

        if ok && detail.has_data && detail.select_data {
            for category in APP_DATA_CATEGORIES {
                let Some(dest_root) = category.source_root(&config.restore_user) else {
                    continue;
                };
                let archive = format!("{}/{}", dir_str, category.archive_name(package, kind));
                // Not every backup carries every category.
                if !shell.exists(&archive).await {
                    continue;
                }
                let done = pipeline
                    .decompress(kind, &archive, &dest_root, Some(sink))
                    .await;
                let done = done
                    && pipeline
                        .set_owner_and_selinux(
                            category,
                            package,
                            &format!("{}/{}", dest_root, package),
                            &config.restore_user,
                            "",
                            Some(sink),
                        )
                        .await;
                ok = done && ok;
            }
        }

        if ok {
            succeeded += 1;
        } else {
            println!("  {}: FAILED", package);
        }
    }

    engine.record_run(RunRecord {
        date: layout::timestamp_key(),
        mode: "restore-apps".to_string(),
        user_id: config.restore_user.clone(),
        total: targets.len(),
        succeeded,
    });

    println!("\nRestored {}/{} apps.", succeeded, targets.len());
    Ok(())
}

/// Execute `restore media --date <date> [names...]`.
pub async fn cmd_restore_media(
    shell: &Shell,
    config: &Config,
    date: String,
    names: Vec<String>,
) -> Result<()> {
    let engine = Engine::new(shell, config);
    engine.require_root().await?;

    let map = engine.reconcile_media_restore_map().await;
    let targets: Vec<String> = if names.is_empty() {
        map.iter()
            .filter(|(_, record)| {
                record
                    .restore_list
                    .iter()
                    .any(|d| d.date == date && d.select_data)
            })
            .map(|(key, _)| key.clone())
            .collect()
    } else {
        names
    };

    if targets.is_empty() {
        println!("Nothing to restore for date {}.", date);
        return Ok(());
    }

    let root = engine.layout().media_root(&config.backup_user);
    let pipeline = Pipeline::new(shell, config);
    let sink: &ProgressSink = &|line: &str| println!("    {}", line);

    let mut succeeded = 0;
    for name in &targets {
        let Some(record) = map.get(name) else {
            println!("  {}: not in media restore map, skipping", name);
            continue;
        };
        let Some(detail) = record.restore_list.iter().find(|d| d.date == date) else {
            println!("  {}: no restore point at {}, skipping", name, date);
            continue;
        };
        if !detail.has_data {
            println!("  {}: archive missing on disk, skipping", name);
            continue;
        }

        let dir = Layout::archive_dir(&root, name, &date);
        let dir_str = dir.to_string_lossy().to_string();
        let kind = detect_codec(shell, &dir_str)
            .await
            .unwrap_or(config.compression);

        // Archives were created relative to the medium's parent directory.
        let dest = if record.path.is_empty() {
            format!("/data/media/{}", config.restore_user)
        } else {
            match record.path.trim_end_matches('/').rsplit_once('/') {
                Some((parent, _)) if !parent.is_empty() => parent.to_string(),
                _ => format!("/data/media/{}", config.restore_user),
            }
        };

        println!("Restoring {} from {}", name, date);
        let archive = format!(
            "{}/{}",
            dir_str,
            DataCategory::Media.archive_name(name, kind)
        );
        let ok = pipeline.decompress(kind, &archive, &dest, Some(sink)).await
            && pipeline
                .set_owner_and_selinux(
                    DataCategory::Media,
                    name,
                    &format!("{}/{}", dest, name),
                    &config.restore_user,
                    "",
                    Some(sink),
                )
                .await;

        if ok {
            succeeded += 1;
        } else {
            println!("  {}: FAILED", name);
        }
    }

    engine.record_run(RunRecord {
        date: layout::timestamp_key(),
        mode: "restore-media".to_string(),
        user_id: config.restore_user.clone(),
        total: targets.len(),
        succeeded,
    });

    println!("\nRestored {}/{} media directories.", succeeded, targets.len());
    Ok(())
}

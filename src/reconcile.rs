//! Listing reconciler.
//!
//! Rebuilds the authoritative entity maps by cross-referencing a persisted
//! snapshot against a flat, path-sorted recursive listing of the backup
//! root. Disk is the truth for restore history; the live package manager is
//! the truth for current identity. The two can disagree (app uninstalled but
//! archive remains, app installed but never backed up) and both facts stay
//! representable.
//!
//! The reconciler is a pure, synchronous transformation: no shell, no
//! filesystem, no internal concurrency. The caller supplies the listing in
//! path-sorted order; grouping relies on it.

use std::collections::BTreeSet;
use std::path::Path;

use crate::model::{
    AppBackupMap, AppRestoreDetail, AppRestoreMap, AppRestoreRecord, MediaBackupDetail,
    MediaBackupMap, MediaBackupRecord, MediaRestoreDetail, MediaRestoreMap, MediaRestoreRecord,
};
use crate::pm::PackageMeta;

/// Media directories seeded into an empty media backup map.
pub const DEFAULT_MEDIA: [(&str, &str); 4] = [
    ("DCIM", "/storage/emulated/0/DCIM"),
    ("Download", "/storage/emulated/0/Download"),
    ("Music", "/storage/emulated/0/Music"),
    ("Pictures", "/storage/emulated/0/Pictures"),
];

/// One listing line decomposed relative to the scan root.
///
/// Only paths with exactly three relative segments participate in
/// reconciliation: `<entityKey>/<date>/<fileName>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub key: String,
    pub date: String,
    pub file: String,
}

/// Structured path decomposition. Returns `None` for lines outside the root
/// or with the wrong segment count; such lines are ignored.
pub fn parse_listing_line(root: &Path, line: &str) -> Option<ListingEntry> {
    let rel = Path::new(line.trim()).strip_prefix(root).ok()?;
    let mut segments = rel.iter().filter_map(|s| s.to_str());
    let key = segments.next()?;
    let date = segments.next()?;
    let file = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    Some(ListingEntry {
        key: key.to_string(),
        date: date.to_string(),
        file: file.to_string(),
    })
}

/// Find the element matching the predicate, inserting a new one if absent.
pub fn upsert_by<T>(
    list: &mut Vec<T>,
    matches: impl Fn(&T) -> bool,
    create: impl FnOnce() -> T,
) -> &mut T {
    match list.iter().position(|item| matches(item)) {
        Some(idx) => &mut list[idx],
        None => {
            list.push(create());
            let idx = list.len() - 1;
            &mut list[idx]
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SeenApp {
    app: bool,
    data: bool,
}

fn classify_app_file(file: &str, seen: &mut SeenApp) {
    if file.contains("apk.tar") {
        seen.app = true;
    } else if file.contains("data.tar")
        || file.contains("obb.tar")
        || file.contains("user.tar")
        || file.contains("user_de.tar")
    {
        seen.data = true;
    }
}

/// Reconcile the app restore map against the backup root listing.
///
/// Presence flags only ever degrade: a fresh detail starts all-true, a
/// surviving persisted detail contributes its stored flags, and both are
/// ANDed with the evidence found on disk. Selection follows presence.
pub fn reconcile_app_restore(
    mut map: AppRestoreMap,
    root: &Path,
    listing: &[String],
) -> AppRestoreMap {
    let entries: Vec<ListingEntry> = listing
        .iter()
        .filter_map(|line| parse_listing_line(root, line))
        .collect();

    // Restore points whose date no longer exists anywhere on disk are
    // dropped before grouping.
    let live_dates: BTreeSet<&str> = entries.iter().map(|e| e.date.as_str()).collect();
    for record in map.values_mut() {
        record
            .restore_list
            .retain(|detail| live_dates.contains(detail.date.as_str()));
    }

    // Sentinel entry: the final real group flushes through the same
    // compare-with-next logic as every other group.
    let sentinel = ListingEntry {
        key: String::new(),
        date: String::new(),
        file: String::new(),
    };

    let mut seen = SeenApp::default();
    let mut details: Vec<AppRestoreDetail> = Vec::new();

    for idx in 0..entries.len() {
        let entry = &entries[idx];
        let next = entries.get(idx + 1).unwrap_or(&sentinel);

        classify_app_file(&entry.file, &mut seen);

        if entry.date != next.date || entry.key != next.key {
            let seed = map
                .get(&entry.key)
                .and_then(|r| r.restore_list.iter().find(|d| d.date == entry.date))
                .cloned()
                .unwrap_or_else(|| AppRestoreDetail::fresh(&entry.date));

            let detail = upsert_by(&mut details, |d| d.date == entry.date, || seed);
            detail.has_app = detail.has_app && seen.app;
            detail.has_data = detail.has_data && seen.data;
            detail.select_app = detail.select_app && detail.has_app;
            detail.select_data = detail.select_data && detail.has_data;

            seen = SeenApp::default();
        }

        if entry.key != next.key {
            let record = map
                .entry(entry.key.clone())
                .or_insert_with(|| AppRestoreRecord::retrieved(&entry.key));
            record.base.package_name = entry.key.clone();
            record.restore_list = std::mem::take(&mut details);

            seen = SeenApp::default();
        }
    }

    map
}

/// Reconcile the media restore map. Media archives carry a single data
/// category, keyed by a file named after the medium.
pub fn reconcile_media_restore(
    mut map: MediaRestoreMap,
    root: &Path,
    listing: &[String],
) -> MediaRestoreMap {
    let entries: Vec<ListingEntry> = listing
        .iter()
        .filter_map(|line| parse_listing_line(root, line))
        .collect();

    let live_dates: BTreeSet<&str> = entries.iter().map(|e| e.date.as_str()).collect();
    for record in map.values_mut() {
        record
            .restore_list
            .retain(|detail| live_dates.contains(detail.date.as_str()));
    }

    let sentinel = ListingEntry {
        key: String::new(),
        date: String::new(),
        file: String::new(),
    };

    let mut seen_data = false;
    let mut details: Vec<MediaRestoreDetail> = Vec::new();

    for idx in 0..entries.len() {
        let entry = &entries[idx];
        let next = entries.get(idx + 1).unwrap_or(&sentinel);

        if entry.file.contains(&format!("{}.tar", entry.key)) {
            seen_data = true;
        }

        if entry.date != next.date || entry.key != next.key {
            let seed = map
                .get(&entry.key)
                .and_then(|r| r.restore_list.iter().find(|d| d.date == entry.date))
                .cloned()
                .unwrap_or_else(|| MediaRestoreDetail::fresh(&entry.date));

            let detail = upsert_by(&mut details, |d| d.date == entry.date, || seed);
            detail.has_data = detail.has_data && seen_data;
            detail.select_data = detail.select_data && detail.has_data;

            seen_data = false;
        }

        if entry.key != next.key {
            let record = map
                .entry(entry.key.clone())
                .or_insert_with(|| MediaRestoreRecord {
                    name: entry.key.clone(),
                    ..MediaRestoreRecord::default()
                });
            record.name = entry.key.clone();
            record.restore_list = std::mem::take(&mut details);

            seen_data = false;
        }
    }

    map
}

/// On-device pass for the backup map: overwrite base descriptors and next-
/// backup version fields from the live package manager.
pub fn apply_installed_packages_backup(map: &mut AppBackupMap, metas: &[PackageMeta]) {
    for meta in metas {
        let record = map.entry(meta.package_name.clone()).or_default();
        record.base.package_name = meta.package_name.clone();
        record.base.app_name = meta.label.clone();
        record.base.system_app = meta.system_app;
        record.base.first_install_time = meta.first_install_time.clone();
        record.base.on_device = true;
        record.backup.version_name = meta.version_name.clone();
        record.backup.version_code = meta.version_code;
    }
}

/// On-device pass for the restore map: overwrite base descriptors only.
/// Restore details are disk truth and are never touched here.
pub fn apply_installed_packages_restore(map: &mut AppRestoreMap, metas: &[PackageMeta]) {
    for meta in metas {
        let record = map.entry(meta.package_name.clone()).or_default();
        record.base.package_name = meta.package_name.clone();
        record.base.app_name = meta.label.clone();
        record.base.system_app = meta.system_app;
        record.base.first_install_time = meta.first_install_time.clone();
        record.base.on_device = true;
    }
}

/// Seed an empty media backup map with the conventional shared-storage
/// directories.
pub fn seed_default_media(map: &mut MediaBackupMap) {
    if !map.is_empty() {
        return;
    }
    for (name, path) in DEFAULT_MEDIA {
        map.insert(
            name.to_string(),
            MediaBackupRecord {
                name: name.to_string(),
                path: path.to_string(),
                backup: MediaBackupDetail::default(),
            },
        );
    }
}

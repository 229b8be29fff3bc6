//! Reconciler tests: grouping, flag degradation, idempotence.
//!
//! These exercise the pure fold over a sorted listing; no shell and no
//! filesystem are involved.

mod helpers;

use std::path::Path;

use helpers::listing;
use rootstash::model::{
    AppRestoreDetail, AppRestoreMap, AppRestoreRecord, MediaRestoreMap, RETRIEVED_LABEL,
};
use rootstash::pm::PackageMeta;
use rootstash::reconcile::{
    apply_installed_packages_restore, reconcile_app_restore, reconcile_media_restore,
    seed_default_media,
};

fn root() -> &'static Path {
    Path::new("/backup/0/data")
}

#[test]
fn test_grouping_two_packages_three_dates() {
    let lines = listing(
        root(),
        &[
            ("pkgA", "20240101", "apk.tar"),
            ("pkgA", "20240101", "data.tar"),
            ("pkgA", "20240201", "apk.tar"),
            ("pkgB", "20240101", "data.tar"),
        ],
    );

    let map = reconcile_app_restore(AppRestoreMap::new(), root(), &lines);

    let a = &map["pkgA"];
    assert_eq!(a.restore_list.len(), 2);
    let d1 = &a.restore_list[0];
    assert_eq!(d1.date, "20240101");
    assert!(d1.has_app && d1.has_data);
    let d2 = &a.restore_list[1];
    assert_eq!(d2.date, "20240201");
    assert!(d2.has_app);
    assert!(!d2.has_data);

    let b = &map["pkgB"];
    assert_eq!(b.restore_list.len(), 1);
    let d = &b.restore_list[0];
    assert_eq!(d.date, "20240101");
    assert!(!d.has_app);
    assert!(d.has_data);
}

#[test]
fn test_last_group_is_not_dropped() {
    // The final real group must flush through the same boundary logic as
    // every other group; losing it is the classic off-by-one here.
    let lines = listing(root(), &[("zz.last", "20240301", "apk.tar")]);
    let map = reconcile_app_restore(AppRestoreMap::new(), root(), &lines);

    assert!(map.contains_key("zz.last"));
    assert_eq!(map["zz.last"].restore_list.len(), 1);
    assert!(map["zz.last"].restore_list[0].has_app);
}

#[test]
fn test_reconcile_is_idempotent() {
    let lines = listing(
        root(),
        &[
            ("pkgA", "20240101", "apk.tar.zst"),
            ("pkgA", "20240101", "user.tar.zst"),
            ("pkgB", "20240105", "apk.tar.zst"),
        ],
    );

    let first = reconcile_app_restore(AppRestoreMap::new(), root(), &lines);
    let second = reconcile_app_restore(first.clone(), root(), &lines);

    let a = serde_json::to_string(&first).unwrap();
    let b = serde_json::to_string(&second).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_presence_flags_only_degrade() {
    let full = listing(
        root(),
        &[
            ("pkgA", "20240101", "apk.tar"),
            ("pkgA", "20240101", "data.tar"),
        ],
    );
    let map = reconcile_app_restore(AppRestoreMap::new(), root(), &full);
    assert!(map["pkgA"].restore_list[0].has_data);

    // The data archive disappears from disk.
    let shrunk = listing(root(), &[("pkgA", "20240101", "apk.tar")]);
    let map = reconcile_app_restore(map, root(), &shrunk);
    let detail = &map["pkgA"].restore_list[0];
    assert!(detail.has_app);
    assert!(!detail.has_data);
    assert!(!detail.select_data);

    // The file coming back does not resurrect the flag without a fresh
    // backup.
    let map = reconcile_app_restore(map, root(), &full);
    let detail = &map["pkgA"].restore_list[0];
    assert!(detail.has_app);
    assert!(!detail.has_data);
}

#[test]
fn test_selection_degrades_with_presence() {
    let mut map = AppRestoreMap::new();
    let mut record = AppRestoreRecord::retrieved("pkgA");
    let mut detail = AppRestoreDetail::fresh("20240101");
    detail.select_app = true;
    detail.select_data = true;
    record.restore_list.push(detail);
    map.insert("pkgA".to_string(), record);

    // Only the apk archive remains on disk.
    let lines = listing(root(), &[("pkgA", "20240101", "apk.tar")]);
    let map = reconcile_app_restore(map, root(), &lines);

    let detail = &map["pkgA"].restore_list[0];
    assert!(detail.select_app);
    assert!(!detail.select_data);
}

#[test]
fn test_stale_dates_are_dropped() {
    let mut map = AppRestoreMap::new();
    let mut record = AppRestoreRecord::retrieved("pkgA");
    record.restore_list.push(AppRestoreDetail::fresh("20230101"));
    record.restore_list.push(AppRestoreDetail::fresh("20240101"));
    map.insert("pkgA".to_string(), record);

    let lines = listing(root(), &[("pkgA", "20240101", "apk.tar")]);
    let map = reconcile_app_restore(map, root(), &lines);

    let dates: Vec<&str> = map["pkgA"]
        .restore_list
        .iter()
        .map(|d| d.date.as_str())
        .collect();
    assert_eq!(dates, vec!["20240101"]);
}

#[test]
fn test_entity_records_survive_empty_listing() {
    let mut map = AppRestoreMap::new();
    let mut record = AppRestoreRecord::retrieved("pkgA");
    record.restore_list.push(AppRestoreDetail::fresh("20240101"));
    map.insert("pkgA".to_string(), record);

    // Everything vanished from disk: restore points go, the entity stays.
    let map = reconcile_app_restore(map, root(), &[]);
    assert!(map.contains_key("pkgA"));
    assert!(map["pkgA"].restore_list.is_empty());
}

#[test]
fn test_archive_only_entity_is_marked_retrieved() {
    let lines = listing(root(), &[("gone.app", "20240101", "apk.tar")]);
    let map = reconcile_app_restore(AppRestoreMap::new(), root(), &lines);

    let record = &map["gone.app"];
    assert!(!record.base.on_device);
    assert_eq!(record.base.app_name, RETRIEVED_LABEL);
    assert_eq!(record.base.package_name, "gone.app");
}

#[test]
fn test_malformed_lines_are_ignored() {
    let mut lines = listing(root(), &[("pkgA", "20240101", "apk.tar")]);
    lines.insert(0, "/backup/0/data/loose-file.txt".to_string());
    lines.push("/backup/0/data/pkgA/20240101/nested/too/deep.tar".to_string());
    lines.push("/somewhere/else/pkgB/20240101/apk.tar".to_string());

    let map = reconcile_app_restore(AppRestoreMap::new(), root(), &lines);
    assert_eq!(map.len(), 1);
    assert!(map.contains_key("pkgA"));
}

#[test]
fn test_device_pass_never_touches_restore_details() {
    let lines = listing(root(), &[("com.app", "20240101", "apk.tar")]);
    let mut map = reconcile_app_restore(AppRestoreMap::new(), root(), &lines);
    let before = map["com.app"].restore_list.clone();

    let metas = vec![PackageMeta {
        package_name: "com.app".to_string(),
        label: "com.app".to_string(),
        version_name: "2.0".to_string(),
        version_code: 42,
        system_app: false,
        first_install_time: "2024-01-01 10:00:00".to_string(),
    }];
    apply_installed_packages_restore(&mut map, &metas);

    let record = &map["com.app"];
    assert!(record.base.on_device);
    assert_eq!(record.base.app_name, "com.app");
    assert_eq!(record.restore_list, before);
}

#[test]
fn test_media_reconcile_keys_on_medium_name() {
    let root = Path::new("/backup/0/media");
    let lines = listing(
        root,
        &[
            ("Pictures", "20240101", "Pictures.tar.zst"),
            ("Music", "20240101", "cover.jpg"),
        ],
    );

    let map = reconcile_media_restore(MediaRestoreMap::new(), root, &lines);

    assert!(map["Pictures"].restore_list[0].has_data);
    // A stray file not named after the medium is no evidence of data.
    assert!(!map["Music"].restore_list[0].has_data);
}

#[test]
fn test_media_seeding_only_fills_empty_maps() {
    let mut map = rootstash::model::MediaBackupMap::new();
    seed_default_media(&mut map);
    assert_eq!(map.len(), 4);
    assert_eq!(map["Pictures"].path, "/storage/emulated/0/Pictures");

    let mut map = rootstash::model::MediaBackupMap::new();
    map.insert(
        "Custom".to_string(),
        rootstash::model::MediaBackupRecord {
            name: "Custom".to_string(),
            path: "/storage/emulated/0/Custom".to_string(),
            ..Default::default()
        },
    );
    seed_default_media(&mut map);
    assert_eq!(map.len(), 1);
}

//! Persisted map store tests: tolerant loading, whole-file overwrite.

mod helpers;

use helpers::TestEnv;
use rootstash::model::{AppRestoreDetail, AppRestoreMap, AppRestoreRecord, RunHistory, RunRecord};
use rootstash::store;

#[test]
fn test_missing_file_loads_empty() {
    let env = TestEnv::new();
    let map: AppRestoreMap = store::load(&env.base.join("nope.json"));
    assert!(map.is_empty());
}

#[test]
fn test_corrupt_file_loads_empty_then_saves_valid_json() {
    let env = TestEnv::new();
    let path = env.base.join("app_restore_map.json");
    std::fs::write(&path, "{ not json at all").unwrap();

    let map: AppRestoreMap = store::load(&path);
    assert!(map.is_empty());

    // A save over the corrupt file must produce JSON the loader accepts.
    store::save(&path, &map).unwrap();
    let reloaded: AppRestoreMap = store::load(&path);
    assert_eq!(reloaded, map);
}

#[test]
fn test_round_trip_preserves_records() {
    let env = TestEnv::new();
    let path = env.base.join("config").join("app_restore_map.json");

    let mut map = AppRestoreMap::new();
    let mut record = AppRestoreRecord::retrieved("com.app");
    let mut detail = AppRestoreDetail::fresh("1700000000");
    detail.has_data = false;
    detail.select_data = false;
    record.restore_list.push(detail);
    map.insert("com.app".to_string(), record);

    store::save(&path, &map).unwrap();
    let reloaded: AppRestoreMap = store::load(&path);
    assert_eq!(reloaded, map);
}

#[test]
fn test_unknown_and_missing_fields_tolerated() {
    let env = TestEnv::new();
    let path = env.base.join("map.json");

    // A record written by a different build: extra field, most fields absent.
    std::fs::write(
        &path,
        r#"{"com.app": {"base": {"package_name": "com.app", "brand_new_field": 7}}}"#,
    )
    .unwrap();

    let map: AppRestoreMap = store::load(&path);
    let record = &map["com.app"];
    assert_eq!(record.base.package_name, "com.app");
    assert!(!record.base.on_device);
    assert!(record.restore_list.is_empty());
}

#[test]
fn test_repeated_saves_are_byte_identical() {
    let env = TestEnv::new();
    let path = env.base.join("map.json");

    let mut map = AppRestoreMap::new();
    map.insert("b.app".to_string(), AppRestoreRecord::retrieved("b.app"));
    map.insert("a.app".to_string(), AppRestoreRecord::retrieved("a.app"));

    store::save(&path, &map).unwrap();
    let first = std::fs::read(&path).unwrap();

    let reloaded: AppRestoreMap = store::load(&path);
    store::save(&path, &reloaded).unwrap();
    let second = std::fs::read(&path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_run_history_appends() {
    let env = TestEnv::new();
    let path = env.base.join("run_history.json");

    let mut history: RunHistory = store::load(&path);
    history.push(RunRecord {
        date: "1700000000".to_string(),
        mode: "backup-apps".to_string(),
        user_id: "0".to_string(),
        total: 3,
        succeeded: 3,
    });
    store::save(&path, &history).unwrap();

    let reloaded: RunHistory = store::load(&path);
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].mode, "backup-apps");
}

//! Archive pipeline tests, driven end-to-end through `sh` and real `tar`.

mod helpers;

use std::sync::{Arc, Mutex};

use helpers::{touch, TestEnv};
use rootstash::archive::{
    CompressionType, DataCategory, Pipeline, STAGE_COMPRESSING, STAGE_FINISHED, STAGE_SKIPPED,
    STAGE_TESTING,
};
use rootstash::shell::ProgressSink;
use rootstash::size::{size_of, SizeMode};

/// Collects progress markers and output lines for assertions.
struct Markers {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Markers {
    fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn contains(&self, marker: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l == marker)
    }

    fn last(&self) -> Option<String> {
        self.lines.lock().unwrap().last().cloned()
    }
}

#[tokio::test]
async fn test_compress_skips_unchanged_source_with_existing_archive() {
    let env = TestEnv::new();
    let shell = env.shell();
    let config = env.config();

    let src_root = env.base.join("src");
    touch(&src_root.join("com.app/file.txt"));
    let out_dir = env.base.join("out");
    let archive = out_dir.join("data.tar");
    touch(&archive);
    let archive_before = std::fs::read(&archive).unwrap();

    let src_root_str = src_root.to_string_lossy().to_string();
    let probe = src_root.join("com.app").to_string_lossy().to_string();
    let prev = size_of(&shell, &probe, SizeMode::Occupied).await;
    assert_ne!(prev, "0");

    let markers = Markers::new();
    let lines_handle = markers.lines.clone();
    let closure = move |l: &str| lines_handle.lock().unwrap().push(l.to_string());
    let sink: &ProgressSink = &closure;

    let pipeline = Pipeline::new(&shell, &config);
    let ok = pipeline
        .compress(
            CompressionType::Tar,
            DataCategory::Data,
            "com.app",
            &out_dir.to_string_lossy(),
            &src_root_str,
            Some(prev.as_str()),
            Some(sink),
        )
        .await;

    assert!(ok);
    assert!(markers.contains(STAGE_SKIPPED));
    assert!(!markers.contains(STAGE_COMPRESSING));
    assert_eq!(markers.last().as_deref(), Some(STAGE_FINISHED));
    // The placeholder archive was not rewritten.
    assert_eq!(std::fs::read(&archive).unwrap(), archive_before);
}

#[tokio::test]
async fn test_compress_runs_when_fingerprint_changed() {
    let env = TestEnv::new();
    let shell = env.shell();
    let config = env.config();

    let src_root = env.base.join("src");
    touch(&src_root.join("com.app/file.txt"));
    let out_dir = env.base.join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let markers = Markers::new();
    let lines_handle = markers.lines.clone();
    let closure = move |l: &str| lines_handle.lock().unwrap().push(l.to_string());
    let sink: &ProgressSink = &closure;

    let pipeline = Pipeline::new(&shell, &config);
    let ok = pipeline
        .compress(
            CompressionType::Tar,
            DataCategory::Data,
            "com.app",
            &out_dir.to_string_lossy(),
            &src_root.to_string_lossy(),
            Some("stale-token"),
            Some(sink),
        )
        .await;

    assert!(ok);
    assert!(markers.contains(STAGE_COMPRESSING));
    assert!(!markers.contains(STAGE_SKIPPED));
    assert!(out_dir.join("data.tar").exists());
}

#[tokio::test]
async fn test_compress_without_fingerprint_always_runs() {
    let env = TestEnv::new();
    let shell = env.shell();
    let config = env.config();

    let src_root = env.base.join("src");
    touch(&src_root.join("com.app/file.txt"));
    let out_dir = env.base.join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let pipeline = Pipeline::new(&shell, &config);
    let ok = pipeline
        .compress(
            CompressionType::Tar,
            DataCategory::Data,
            "com.app",
            &out_dir.to_string_lossy(),
            &src_root.to_string_lossy(),
            None,
            None,
        )
        .await;

    assert!(ok);
    assert!(out_dir.join("data.tar").exists());
}

#[tokio::test]
async fn test_compress_missing_source_is_hard_failure_but_terminates_stream() {
    let env = TestEnv::new();
    let shell = env.shell();
    let config = env.config();

    let out_dir = env.base.join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let markers = Markers::new();
    let lines_handle = markers.lines.clone();
    let closure = move |l: &str| lines_handle.lock().unwrap().push(l.to_string());
    let sink: &ProgressSink = &closure;

    let pipeline = Pipeline::new(&shell, &config);
    let ok = pipeline
        .compress(
            CompressionType::Tar,
            DataCategory::Data,
            "com.gone",
            &out_dir.to_string_lossy(),
            &env.base.join("nowhere").to_string_lossy(),
            None,
            Some(sink),
        )
        .await;

    assert!(!ok);
    assert_eq!(markers.last().as_deref(), Some(STAGE_FINISHED));
}

#[tokio::test]
async fn test_verification_runs_when_enabled() {
    let env = TestEnv::new();
    let shell = env.shell();
    let mut config = env.config();
    config.verify_archives = true;

    let src_root = env.base.join("src");
    touch(&src_root.join("com.app/file.txt"));
    let out_dir = env.base.join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let markers = Markers::new();
    let lines_handle = markers.lines.clone();
    let closure = move |l: &str| lines_handle.lock().unwrap().push(l.to_string());
    let sink: &ProgressSink = &closure;

    let pipeline = Pipeline::new(&shell, &config);
    let ok = pipeline
        .compress(
            CompressionType::Tar,
            DataCategory::Data,
            "com.app",
            &out_dir.to_string_lossy(),
            &src_root.to_string_lossy(),
            None,
            Some(sink),
        )
        .await;

    assert!(ok);
    assert!(markers.contains(STAGE_TESTING));
}

#[tokio::test]
async fn test_test_archive_rejects_garbage() {
    let env = TestEnv::new();
    let shell = env.shell();
    let config = env.config();

    let bogus = env.base.join("bogus.tar");
    std::fs::write(&bogus, b"this is not a tar archive").unwrap();

    let pipeline = Pipeline::new(&shell, &config);
    let ok = pipeline
        .test_archive(CompressionType::Tar, &bogus.to_string_lossy())
        .await;
    assert!(!ok);
    // The archive is left in place for inspection.
    assert!(bogus.exists());
}

#[tokio::test]
async fn test_decompress_extracts_into_destination() {
    let env = TestEnv::new();
    let shell = env.shell();
    let config = env.config();

    let src_root = env.base.join("src");
    touch(&src_root.join("com.app/data/notes.txt"));
    let out_dir = env.base.join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let pipeline = Pipeline::new(&shell, &config);
    assert!(
        pipeline
            .compress(
                CompressionType::Tar,
                DataCategory::Data,
                "com.app",
                &out_dir.to_string_lossy(),
                &src_root.to_string_lossy(),
                None,
                None,
            )
            .await
    );

    let dest = env.base.join("restored");
    let ok = pipeline
        .decompress(
            CompressionType::Tar,
            &out_dir.join("data.tar").to_string_lossy(),
            &dest.to_string_lossy(),
            None,
        )
        .await;

    assert!(ok);
    assert!(dest.join("com.app/data/notes.txt").exists());
}

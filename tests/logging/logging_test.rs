//! Tests for `src/logging.rs`.

use macpol::logging::{LoggingGuard, LOG_FILE_PREFIX};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_production_creates_logs_dir_and_rotated_file() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // Only one global subscriber can be installed per process, so the
    // result is ignored; the appender opens its file before installation.
    let _result = macpol::logging::init_production(&logs_dir, "info");
    assert!(logs_dir.exists(), "logs directory should be created");

    let names: Vec<String> = std::fs::read_dir(&logs_dir)
        .expect("should list logs dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    let dated = format!("{LOG_FILE_PREFIX}.");
    assert!(
        names.iter().any(|name| name.starts_with(&dated)),
        "expected a {dated}YYYY-MM-DD file, found {names:?}"
    );
}

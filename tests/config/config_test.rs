//! Tests for loading compiler configuration from disk.

use std::io::Write;

use macpol::config::load_config;
use macpol::policydb::HandleUnknown;

#[test]
fn load_config_reads_every_section() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"
[policy]
version = 30
handle_unknown = "allow"

[limits]
max_expanded_rules = 5000

[checks]
assertions = false

[sids]
required = ["kernel", "security"]

[logging]
level = "debug"
"#
    )
    .expect("write config");

    let config = load_config(file.path()).expect("load");
    assert_eq!(config.policy.version, 30);
    assert!(!config.policy.mls);
    assert_eq!(config.policy.handle_unknown, Some(HandleUnknown::Allow));
    assert_eq!(config.limits.max_expanded_rules, 5000);
    assert!(!config.checks.assertions);
    assert!(config.checks.hierarchy);
    assert_eq!(config.sids.required, vec!["kernel", "security"]);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn load_config_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = load_config(&dir.path().join("absent.toml")).expect_err("missing");
    assert!(err.to_string().contains("failed to read config"));
}

#[test]
fn load_config_reports_the_path_on_bad_toml() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "[policy]\nversion = \"new\"\n").expect("write config");
    let err = load_config(file.path()).expect_err("invalid");
    assert!(err.to_string().contains("failed to parse config"));
}

//! Config load/save error-message and atomic-write tests.

use std::fs;
use std::time::Duration;

use assert_fs::prelude::*;
use bridge_core::config::{self, BridgeConfig, NotaryTool};
use bridge_core::ConfigError;
use predicates::prelude::predicate;
use rstest::rstest;

// ---------------------------------------------------------------------------
// 1. Load errors
// ---------------------------------------------------------------------------

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".bridge/config.yaml")
        .write_str("service: [unclosed\n  - : :")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn wrong_type_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".bridge/config.yaml")
        .write_str("lifecycle:\n  poll_interval_secs: soon\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn empty_file_is_treated_as_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".bridge/config.yaml").write_str("\n").expect("write");

    let cfg = config::load_at(home.path()).expect("load");
    assert_eq!(cfg, BridgeConfig::default());
}

// ---------------------------------------------------------------------------
// 2. Save
// ---------------------------------------------------------------------------

#[test]
fn save_creates_directory_and_leaves_no_tmp() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut cfg = BridgeConfig::default();
    cfg.trust.identity = "Developer ID Application: Example (ABCDE12345)".to_string();
    cfg.trust.notary_tool = NotaryTool::Altool;

    let path = config::save_at(home.path(), &cfg).expect("save");

    home.child(".bridge/config.yaml").assert(predicate::path::exists());
    home.child(".bridge/config.yaml.tmp")
        .assert(predicate::path::missing());
    assert_eq!(path, config::config_path_at(home.path()));

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded, cfg);
}

#[test]
fn saved_yaml_omits_unset_optionals() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &BridgeConfig::default()).expect("save");

    let text = fs::read_to_string(config::config_path_at(home.path())).expect("read");
    assert!(!text.contains("password"), "unset secret must not be written: {text}");
    assert!(!text.contains("keychain_profile"));
    assert!(text.contains("notary_tool: notarytool"));
}

// ---------------------------------------------------------------------------
// 3. Timing conversion
// ---------------------------------------------------------------------------

#[rstest]
#[case("lifecycle:\n  poll_interval_secs: 2\n", 2, 30)]
#[case("lifecycle:\n  start_timeout_secs: 5\n", 1, 5)]
#[case("{}\n", 1, 30)]
#[case("lifecycle:\n  poll_interval_secs: 0\n", 1, 30)]
fn lifecycle_section_converts_to_timings(
    #[case] yaml: &str,
    #[case] poll_secs: u64,
    #[case] start_secs: u64,
) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".bridge/config.yaml").write_str(yaml).expect("write");

    let timings = config::load_at(home.path()).expect("load").lifecycle.timings();
    assert_eq!(timings.poll_interval, Duration::from_secs(poll_secs));
    assert_eq!(timings.start_timeout, Duration::from_secs(start_secs));
}

#[test]
fn trust_section_converts_to_notarization_timings() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".bridge/config.yaml")
        .write_str("trust:\n  poll_interval_secs: 5\n  timeout_secs: 60\n")
        .expect("write");

    let schedule = config::load_at(home.path())
        .expect("load")
        .trust
        .timings()
        .schedule();
    assert_eq!(schedule.interval, Duration::from_secs(5));
    assert_eq!(schedule.timeout, Duration::from_secs(60));
}

#[test]
fn zero_notarization_poll_interval_is_raised_to_one_second() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".bridge/config.yaml")
        .write_str("trust:\n  poll_interval_secs: 0\n")
        .expect("write");

    let timings = config::load_at(home.path()).expect("load").trust.timings();
    assert_eq!(timings.poll_interval, Duration::from_secs(1));
}

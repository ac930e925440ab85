//! Configuration loading and root folder resolution tests
//!
//! Tests that touch LIBRIS_ROOT_FOLDER / LIBRIS_CONFIG are marked #[serial]
//! so environment mutations never race.

use libris_common::config::{
    resolve_root_folder, LibrisConfig, CONFIG_FILE_ENV, DATABASE_FILE, ROOT_FOLDER_ENV,
};
use libris_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
fn test_defaults_match_documented_values() {
    let config = LibrisConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.activation.login_ttl_secs, 300);
    assert_eq!(config.activation.confirm_ttl_secs, 86_400);
    assert!(config.activation.secret.is_none());
    assert!((config.duplicates.fuzzy_threshold - 0.8).abs() < f64::EPSILON);
    assert_eq!(config.duplicates.fuzzy_limit, 3);
    assert_eq!(config.sweeps.interval_secs, 3600);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = LibrisConfig::from_toml_str(
        r#"
        root_folder = "/srv/libris"

        [activation]
        base_url = "https://catalog.example.org"
        "#,
    )
    .unwrap();

    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/libris")));
    assert_eq!(config.activation.base_url, "https://catalog.example.org");
    // Untouched fields keep their defaults
    assert_eq!(config.activation.confirm_ttl_secs, 86_400);
    assert_eq!(config.duplicates.fuzzy_limit, 3);
}

#[test]
fn test_threshold_out_of_range_rejected() {
    let result = LibrisConfig::from_toml_str(
        r#"
        [duplicates]
        fuzzy_threshold = 1.5
        "#,
    );

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_zero_ttl_rejected() {
    let result = LibrisConfig::from_toml_str(
        r#"
        [activation]
        login_ttl_secs = 0
        "#,
    );

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let result = LibrisConfig::from_toml_str("root_folder = [not toml");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_cli_argument_wins_over_environment() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");

    let resolved = resolve_root_folder(Some("/from/cli"), ROOT_FOLDER_ENV, Some(Path::new("/from/toml")));
    assert_eq!(resolved, PathBuf::from("/from/cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_environment_wins_over_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(Path::new("/from/toml")));
    assert_eq!(resolved, PathBuf::from("/from/env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_used_when_no_override() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(Path::new("/from/toml")));
    assert_eq!(resolved, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_default_root_folder_non_empty() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, None);
    assert!(!resolved.as_os_str().is_empty());
}

#[test]
#[serial]
fn test_database_path_appends_file_name() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = LibrisConfig {
        root_folder: Some(PathBuf::from("/data")),
        ..Default::default()
    };

    assert_eq!(config.database_path(None), PathBuf::from("/data").join(DATABASE_FILE));
}

#[test]
#[serial]
fn test_discover_reads_env_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libris.toml");
    std::fs::write(&path, "[sweeps]\ninterval_secs = 60\n").unwrap();

    env::set_var(CONFIG_FILE_ENV, &path);
    let config = LibrisConfig::discover(None).unwrap();
    env::remove_var(CONFIG_FILE_ENV);

    assert_eq!(config.sweeps.interval_secs, 60);
}

#[test]
#[serial]
fn test_discover_missing_explicit_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = LibrisConfig::discover(Some(&dir.path().join("absent.toml")));

    assert!(matches!(result, Err(Error::Config(_))));
}

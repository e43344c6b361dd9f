use std::fs;
use std::path::PathBuf;

use drover_config::{ConfigLoadError, ConfigLoader, EnvConfig};
use drover_core::fleet::RegionOwnershipPolicy;
use tempfile::TempDir;

fn loader(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::new()
        .with_env_file(dir.path().join("missing.env"))
        .with_env(EnvConfig::default())
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let err = loader(&dir)
        .with_config_path(dir.path().join("nope.toml"))
        .load()
        .expect_err("missing config");
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn file_values_and_relative_accounts_path_are_resolved() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("drover.toml");
    fs::write(
        &config_path,
        r#"
reload_interval_ms = 15000

[fleet]
region_policy = "release"
reservation_reports = false

[fleet.cleanup]
alarms = true

[accounts]
path = "accounts.toml"

[[accounts.inline]]
name = "inline"
regions = ["eu-west-1"]
"#,
    )
    .expect("write config");
    fs::write(
        dir.path().join("accounts.toml"),
        r#"
[[accounts]]
name = "prod"
regions = ["us-east-1", "us-west-2"]

[accounts.capabilities]
container_orchestration = true

[[accounts]]
name = "inline"
regions = ["ap-south-1"]
"#,
    )
    .expect("write accounts");

    let load = loader(&dir)
        .with_config_path(&config_path)
        .load()
        .expect("load");
    let config = load.config;

    assert_eq!(load.path.as_deref(), Some(config_path.as_path()));
    assert!(!load.env_file_loaded);
    assert_eq!(config.fleet.region_policy, RegionOwnershipPolicy::Release);
    assert!(!config.fleet.reservation_reports);
    assert!(config.fleet.cleanup.alarms);
    assert!(config.fleet.cleanup.detached_instances);
    assert_eq!(config.accounts.path, Some(dir.path().join("accounts.toml")));
    assert!(config.reload_interval().is_some());

    let accounts = config.accounts.load().expect("accounts");
    let names: Vec<&str> = accounts.iter().map(|c| c.name().as_str()).collect();
    assert_eq!(names, vec!["inline", "prod"]);
    // The inline definition overrides the file entry with the same name.
    assert_eq!(accounts[0].regions()[0].as_str(), "eu-west-1");
    assert!(accounts[1].capabilities().container_orchestration);
}

#[test]
fn environment_overrides_win_over_the_file() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("drover.toml");
    fs::write(&config_path, "[logging]\nfilter = \"warn\"\n").expect("write");

    let load = ConfigLoader::new()
        .with_env_file(dir.path().join("missing.env"))
        .with_env(EnvConfig {
            config_path: Some(config_path.clone()),
            accounts_path: Some(PathBuf::from("/etc/drover/accounts.toml")),
            log_filter: Some("debug".to_string()),
        })
        .load()
        .expect("load");

    assert_eq!(load.path.as_deref(), Some(config_path.as_path()));
    assert_eq!(load.config.logging.filter, "debug");
    assert_eq!(
        load.config.accounts.path,
        Some(PathBuf::from("/etc/drover/accounts.toml"))
    );
}

#[test]
fn malformed_files_report_their_path() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("drover.toml");
    fs::write(&config_path, "[fleet\nregion_policy = ").expect("write");

    let err = loader(&dir)
        .with_config_path(&config_path)
        .load()
        .expect_err("parse error");
    match err {
        ConfigLoadError::Parse { path, .. } => assert_eq!(path, config_path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unreadable_accounts_files_fail_loudly() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("drover.toml");
    fs::write(&config_path, "[accounts]\npath = \"absent.toml\"\n")
        .expect("write");

    let load = loader(&dir)
        .with_config_path(&config_path)
        .load()
        .expect("load");
    let err = load.config.accounts.load().expect_err("missing accounts");
    assert!(err.to_string().contains("absent.toml"));
}

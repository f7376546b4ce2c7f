// ABOUTME: Behavioral tests for configuration loading
// Verifies defaults, file parsing, explicit paths and validation on load

use agent_pool::config::AppConfig;
use agent_pool::session_pool::{ConfigError, PoolConfig};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

/// Defaults must describe a pool that starts without any config file
#[test]
fn test_default_config_is_valid() {
    let config = AppConfig::default();
    assert!(config.pool.validate().is_ok());
    assert_eq!(config.pool.max_size, 5);
    assert_eq!(config.pool.keep_idle_size, 2);
    assert_eq!(config.pool.idle_timeout, Duration::from_secs(300));
}

#[test]
fn test_explicit_config_file_is_used() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("pool.toml");
    fs::write(
        &path,
        r#"
[pool]
initial_size = 1
keep_idle_size = 1
max_size = 2
health_check_interval = 15
"#,
    )
    .expect("write config");

    let config = AppConfig::load(Some(&path)).expect("load");
    assert_eq!(config.pool.max_size, 2);
    assert_eq!(config.pool.health_check_interval, Duration::from_secs(15));
    assert_eq!(
        config.pool.growth_check_interval,
        PoolConfig::default().growth_check_interval
    );
}

#[test]
fn test_invalid_sizes_are_rejected_on_load() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("pool.toml");
    fs::write(&path, "[pool]\nmax_size = 2\nkeep_idle_size = 3\n").expect("write config");

    let err = AppConfig::load(Some(&path)).expect_err("floor above cap");
    let cause = err
        .downcast_ref::<ConfigError>()
        .expect("validation error is preserved");
    assert_eq!(
        *cause,
        ConfigError::ExceedsMax {
            field: "keep_idle_size",
            value: 3,
            max_size: 2
        }
    );
}

#[test]
fn test_saved_toml_parses_back() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("config.toml");

    let mut config = AppConfig::default();
    config.pool.max_size = 7;
    config.pool.idle_timeout = Duration::from_secs(90);
    fs::write(&path, config.to_toml().expect("render")).expect("write");

    assert_eq!(AppConfig::from_file(&path).expect("parse"), config);
}

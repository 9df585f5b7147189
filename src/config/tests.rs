//! Config module tests

use std::time::Duration;

use super::*;

#[test]
fn test_substitute_env_vars_simple() {
    std::env::set_var("TEST_VAR_SIMPLE", "hello");
    let result = substitute_env_vars("value = \"${TEST_VAR_SIMPLE}\"").unwrap();
    assert_eq!(result, "value = \"hello\"");
    std::env::remove_var("TEST_VAR_SIMPLE");
}

#[test]
fn test_substitute_env_vars_with_default() {
    // Unset var should use default
    std::env::remove_var("TEST_VAR_UNSET");
    let result = substitute_env_vars("value = \"${TEST_VAR_UNSET:-default_value}\"").unwrap();
    assert_eq!(result, "value = \"default_value\"");

    // Set var should use env value
    std::env::set_var("TEST_VAR_SET", "env_value");
    let result = substitute_env_vars("value = \"${TEST_VAR_SET:-default_value}\"").unwrap();
    assert_eq!(result, "value = \"env_value\"");
    std::env::remove_var("TEST_VAR_SET");
}

#[test]
fn test_substitute_env_vars_missing_no_default() {
    std::env::remove_var("TEST_VAR_MISSING");
    let result = substitute_env_vars("value = \"${TEST_VAR_MISSING}\"").unwrap();
    assert_eq!(result, "value = \"\"");
}

#[test]
fn test_load_config_with_env_substitution() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("vibemq.toml");

    std::env::set_var("TEST_DATA_ROOT", "/var/lib/vibemq");

    let config_content = r#"
[persistence]
path = "${TEST_DATA_ROOT}/store"
flush_interval = "${TEST_FLUSH:-2s}"

[topics]
max_topic_levels = ${TEST_MAX_LEVELS:-16}
"#;

    std::fs::write(&config_path, config_content).unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(
        config.persistence.path,
        std::path::PathBuf::from("/var/lib/vibemq/store")
    );
    assert_eq!(config.persistence.flush_interval, Duration::from_secs(2));
    assert_eq!(config.topics.max_topic_levels, 16);
    assert_eq!(config.persistence.backend, BackendType::Fjall);

    std::env::remove_var("TEST_DATA_ROOT");
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config::load(temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.log.level, "info");
    assert_eq!(config.persistence.flush_interval, Duration::from_millis(100));
    assert_eq!(config.persistence.persist_mode, PersistMode::SyncAll);
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.log.level, "info");
    assert_eq!(config.persistence.backend, BackendType::Fjall);
    assert_eq!(config.persistence.path, std::path::PathBuf::from("./data"));
    assert_eq!(config.topics.max_topic_levels, 0);
}

#[test]
fn test_parse_minimal_config() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.persistence.flush_interval, Duration::from_millis(100));
    assert_eq!(config.persistence.persist_mode, PersistMode::SyncAll);
}

#[test]
fn test_parse_full_config() {
    let config = Config::parse(
        r#"
[log]
level = "debug"

[persistence]
backend = "memory"
path = "/tmp/vibemq"
flush_interval = "1s 500ms"
persist_mode = "sync_data"

[topics]
max_topic_levels = 8
"#,
    )
    .unwrap();

    assert_eq!(config.log.level, "debug");
    assert_eq!(config.persistence.backend, BackendType::Memory);
    assert_eq!(config.persistence.flush_interval, Duration::from_millis(1500));
    assert_eq!(config.persistence.persist_mode, PersistMode::SyncData);
    assert_eq!(config.topics.max_topic_levels, 8);
}

#[test]
fn test_invalid_log_level() {
    let result = Config::parse("[log]\nlevel = \"loud\"\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_zero_flush_interval() {
    let result = Config::parse("[persistence]\nflush_interval = \"0s\"\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_unknown_backend() {
    let result = Config::parse("[persistence]\nbackend = \"redis\"\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_persist_mode_maps_to_fjall() {
    assert!(matches!(
        fjall::PersistMode::from(PersistMode::Buffer),
        fjall::PersistMode::Buffer
    ));
    assert!(matches!(
        fjall::PersistMode::from(PersistMode::SyncAll),
        fjall::PersistMode::SyncAll
    ));
}

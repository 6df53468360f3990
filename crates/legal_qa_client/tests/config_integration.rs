//! Integration tests for config load/save and base URL resolution.

use legal_qa_client::config::{self, API_URL_ENV};
use legal_qa_client::{Config, ConfigError};
use predicates::prelude::*;

#[test]
fn load_existing_yaml_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        r#"
api:
  base_url: "http://localhost:8000"
  connect_timeout_secs: 3
query:
  max_results: 8
"#,
    )
    .unwrap();

    let cfg = config::load(&config_path).expect("load should succeed");
    assert_eq!(cfg.api.base_url.as_deref(), Some("http://localhost:8000"));
    assert_eq!(cfg.api.connect_timeout_secs, Some(3));
    assert_eq!(cfg.max_results(), 8);
    assert_eq!(
        cfg.connect_timeout(),
        Some(std::time::Duration::from_secs(3))
    );
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(&config_path, "api:\n  base_url: http://qa.local\n").unwrap();

    let cfg = config::load(&config_path).unwrap();
    assert_eq!(cfg.max_results(), 5);
    assert_eq!(cfg.connect_timeout(), None);
}

#[test]
fn save_creates_directory_and_file_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("legal-qa");
    let config_path = config_dir.join("config.yaml");
    assert!(!config_dir.exists(), "config dir should not exist yet");

    let mut cfg = Config::default();
    cfg.api.base_url = Some("http://localhost:8000".into());
    cfg.query.max_results = Some(3);

    config::save(&config_path, &cfg).expect("save should succeed");
    assert!(
        predicates::path::exists().eval(&config_path),
        "config file should exist after save"
    );

    let contents = std::fs::read_to_string(&config_path).unwrap();
    assert!(predicates::str::contains("base_url").eval(&contents));
    assert!(predicates::str::contains("max_results: 3").eval(&contents));
    assert_eq!(config::load(&config_path).unwrap(), cfg);
}

#[test]
fn load_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = config::load(&dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));

    let cfg = config::load_or_default(&dir.path().join("absent.yaml")).unwrap();
    assert_eq!(cfg, Config::default());
}

#[test]
fn invalid_yaml_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(&config_path, "api: [unclosed\n").unwrap();

    assert!(matches!(
        config::load(&config_path),
        Err(ConfigError::Yaml(_))
    ));
    assert!(matches!(
        config::load_or_default(&config_path),
        Err(ConfigError::Yaml(_))
    ));
}

/// Env-dependent checks live in one test so they cannot race each other.
#[test]
fn environment_overrides_and_default_path() {
    let dir = tempfile::tempdir().unwrap();

    let key = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    let original_home = std::env::var(key).ok();
    let original_url = std::env::var(API_URL_ENV).ok();

    std::env::set_var(key, dir.path());
    let path = config::default_config_path();

    let mut cfg = Config::default();
    std::env::remove_var(API_URL_ENV);
    let missing = cfg.resolve_base_url();

    cfg.api.base_url = Some("http://from-file:8000".into());
    let from_file = cfg.resolve_base_url();

    std::env::set_var(API_URL_ENV, "http://from-env:9000");
    let from_env = cfg.resolve_base_url();

    match original_home {
        Some(v) => std::env::set_var(key, v),
        None => std::env::remove_var(key),
    }
    match original_url {
        Some(v) => std::env::set_var(API_URL_ENV, v),
        None => std::env::remove_var(API_URL_ENV),
    }

    assert_eq!(
        path.expect("should resolve a config path"),
        dir.path().join(".legal-qa").join("config.yaml")
    );
    assert!(matches!(missing, Err(ConfigError::MissingBaseUrl)));
    assert_eq!(from_file.unwrap(), "http://from-file:8000");
    assert_eq!(from_env.unwrap(), "http://from-env:9000");
}

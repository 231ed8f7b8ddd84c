// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, env var overrides, and validation of messenger timings

use serial_test::serial;
use std::io::Write;
use std::time::Duration;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("KITTENGAMES_CONFIG_PATH");
    std::env::remove_var("KITTENGAMES_CATALOG_URL");
    std::env::remove_var("KITTENGAMES_HOST");
    std::env::remove_var("KITTENGAMES_PORT");
    std::env::remove_var("KITTENGAMES_DATA_DIR");
    std::env::remove_var("KITTENGAMES_CACHE_TTL_SECS");
}

fn write_config(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
    let config_path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    config_path
}

#[test]
#[serial]
fn test_config_loads_from_toml_file() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
[server]
host = "0.0.0.0"
port = 9000

[catalog]
url = "https://cdn.example.com/kitten/games.json"
ttl_secs = 60

[messenger]
request_timeout_ms = 5000
restore_grace_ms = 1000

[storage]
data_dir = "/var/lib/kittengames"
"#,
    );
    std::env::set_var("KITTENGAMES_CONFIG_PATH", config_path.to_str().unwrap());

    let config = kittengames::config::Config::load().unwrap();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.catalog.ttl(), Duration::from_secs(60));
    assert_eq!(
        config.catalog.base_url().unwrap().as_str(),
        "https://cdn.example.com/kitten/"
    );
    let messenger = config.messenger.to_config();
    assert_eq!(messenger.request_timeout, Duration::from_secs(5));
    assert_eq!(messenger.settle_delay, Duration::from_millis(500));
    assert_eq!(messenger.restore_grace, Duration::from_secs(1));
    assert_eq!(
        config.storage.data_dir(),
        std::path::PathBuf::from("/var/lib/kittengames")
    );

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_config_env_var_overrides() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
[server]
port = 9000

[catalog]
url = "https://original.example.com/games.json"
"#,
    );
    std::env::set_var("KITTENGAMES_CONFIG_PATH", config_path.to_str().unwrap());
    std::env::set_var(
        "KITTENGAMES_CATALOG_URL",
        "https://mirror.example.com/games.json",
    );
    std::env::set_var("KITTENGAMES_PORT", "9100");
    std::env::set_var("KITTENGAMES_CACHE_TTL_SECS", "30");

    let config = kittengames::config::Config::load().unwrap();

    assert_eq!(config.catalog.url, "https://mirror.example.com/games.json");
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.catalog.ttl_secs, 30);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_invalid_port_env_var_is_an_error() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&temp_dir, "");
    std::env::set_var("KITTENGAMES_CONFIG_PATH", config_path.to_str().unwrap());
    std::env::set_var("KITTENGAMES_PORT", "not-a-port");

    let err = kittengames::config::Config::load().unwrap_err();
    assert!(err.to_string().contains("KITTENGAMES_PORT"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_restore_grace_longer_than_timeout_is_rejected() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
[messenger]
request_timeout_ms = 1000
restore_grace_ms = 2000
"#,
    );
    std::env::set_var("KITTENGAMES_CONFIG_PATH", config_path.to_str().unwrap());

    let err = kittengames::config::Config::load().unwrap_err();
    assert!(err.to_string().contains("restore_grace_ms"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_empty_catalog_url_is_rejected() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&temp_dir, "[catalog]\nurl = \"  \"\n");
    std::env::set_var("KITTENGAMES_CONFIG_PATH", config_path.to_str().unwrap());

    let err = kittengames::config::Config::load().unwrap_err();
    assert!(err.to_string().contains("catalog.url is required"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_malformed_toml_reports_the_file() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&temp_dir, "[server\nport = ");
    std::env::set_var("KITTENGAMES_CONFIG_PATH", config_path.to_str().unwrap());

    let err = kittengames::config::Config::load().unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));

    clear_config_env_vars();
}

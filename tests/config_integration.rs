use serial_test::serial;
use shout::config::AppConfig;
use std::env;
use std::fs;
use std::time::Duration;

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("SHOUT_SERVER__PORT");
        env::remove_var("SHOUT_CLIENT__HOST");
        env::remove_var("SHOUT_RELAY__REAP_INTERVAL_SECS");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
        env::remove_var("RELAY_HOST");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(["shout"]).expect("Failed to load config");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.static_dir, "static");
    assert_eq!(config.relay.reap_interval(), Duration::from_secs(30));
    assert_eq!(config.client.host, "localhost:3000");
    assert!(!config.client.secure);
    assert_eq!(config.client.delay(), Duration::from_secs(10));
    assert_eq!(config.client.ping_interval(), Duration::from_secs(10));
    assert!(!config.log.json);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("SHOUT_SERVER__PORT", "9090");
        env::set_var("SHOUT_RELAY__REAP_INTERVAL_SECS", "5");
    }

    let config = AppConfig::load_from_args(["shout"]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.relay.reap_interval_secs, 5);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = dir.path().join("shout.yaml");
    fs::write(
        &file_path,
        r#"
server:
  port: 7070
client:
  host: "relay.example:80"
    "#,
    )
    .expect("Failed to write temp config");

    // Tell AppConfig to use this file via Env Var (mocking CLI arg indirectly)
    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = AppConfig::load_from_args(["shout"]).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.client.host, "relay.example:80");

    clear_env_vars();
}

#[test]
#[serial]
fn test_precedence_cli_over_env_over_file() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = dir.path().join("shout.yaml");
    fs::write(&file_path, "server:\n  port: 7070\n").expect("Failed to write temp config");
    let file_arg = file_path.to_string_lossy().to_string();

    unsafe {
        env::set_var("SHOUT_SERVER__PORT", "8080");
    }
    let config = AppConfig::load_from_args(["shout", "--config", file_arg.as_str()])
        .expect("Failed to load config");
    assert_eq!(config.server.port, 8080);

    let config = AppConfig::load_from_args([
        "shout",
        "--config",
        file_arg.as_str(),
        "--port",
        "6000",
        "--relay",
        "example.org:3000",
        "--log-json",
    ])
    .expect("Failed to load config");
    assert_eq!(config.server.port, 6000);
    assert_eq!(config.client.host, "example.org:3000");
    assert!(config.log.json);

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_config_file_is_an_error() {
    clear_env_vars();
    let result = AppConfig::load_from_args(["shout", "--config", "/nonexistent/shout.yaml"]);
    assert!(result.is_err());
}

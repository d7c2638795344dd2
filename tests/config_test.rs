// Test configuration loading
use clap::Parser;
use ct_warden::cli::Cli;
use ct_warden::config::{Backend, Config};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[test]
fn test_load_test_config() {
    let config_path = Path::new("tests/test_config.toml");
    let config = Config::from_file(config_path).expect("Failed to load test config");

    // Verify stream config
    assert_eq!(config.stream.url, "ws://127.0.0.1:4000/full-stream");
    assert_eq!(config.stream.reconnect_delay(), Duration::from_secs(5));

    // Verify storage config
    assert_eq!(config.storage.backend, Backend::Embedded);
    assert_eq!(
        config.storage.embedded.path,
        PathBuf::from("/var/lib/ct-warden/monitor.db")
    );
    assert_eq!(config.storage.embedded.open_timeout_secs, 3);

    let remote = &config.storage.remote;
    assert_eq!(remote.host, "redis.example.internal");
    assert_eq!(remote.port, 6380);
    assert_eq!(remote.password, Some("test_password".to_string()));
    assert_eq!(remote.db, 1);
    assert!(remote.persist_matches);
    assert_eq!(remote.history_limit, 500);
    assert_eq!(
        remote.url(),
        "redis://:test_password@redis.example.internal:6380/1"
    );

    // Verify the rest
    assert_eq!(config.api.bind, "127.0.0.1:1323");
    assert_eq!(config.worker.stats_interval_secs, 30);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.notifiers.log_file, Some(PathBuf::from("matches.json")));
    assert_eq!(config.notifiers.redis_channel, Some("ct_matches".to_string()));
}

#[test]
fn test_cli_overrides_test_config() {
    let cli = Cli::parse_from([
        "ct-warden",
        "--config",
        "tests/test_config.toml",
        "--stream-url",
        "wss://certstream.example.net/",
        "--backend",
        "remote",
        "--db-path",
        "/tmp/other.db",
    ]);

    let config = cli.load_config().unwrap();

    assert_eq!(config.stream.url, "wss://certstream.example.net/");
    assert_eq!(config.storage.backend, Backend::Remote);
    assert_eq!(config.storage.embedded.path, PathBuf::from("/tmp/other.db"));
    // Untouched values still come from the file
    assert_eq!(config.worker.stats_interval_secs, 30);
}

#[test]
fn test_cli_override_is_validated() {
    let cli = Cli::parse_from([
        "ct-warden",
        "--config",
        "tests/test_config.toml",
        "--stream-url",
        "http://certstream.example.net/",
    ]);

    assert!(cli.load_config().is_err());
}

#[test]
fn test_missing_config_file() {
    let cli = Cli::parse_from(["ct-warden", "--config", "tests/does_not_exist.toml"]);
    assert!(cli.load_config().is_err());
}

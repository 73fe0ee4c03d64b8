//! Integration tests for configuration loading

use market_capture::config::Config;
use market_capture::telemetry::LogFormat;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_example_parses() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();

    assert_eq!(config.connection.host, "127.0.0.1");
    assert!(config.connection.validate().is_ok());
    assert_eq!(config.streams.option_trade, "FORTS_OPTTRADE_REPL");
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
    assert!(config.telemetry.metrics_port.is_none());

    let settings = config.capture_settings();
    assert_eq!(settings.init_timeout, Duration::from_secs(30));
    assert_eq!(settings.streams, config.streams);
}

#[test]
fn test_config_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [connection]
        host = "gateway.internal"
        port = 4001
        app_name = "capture_b"

        [publisher]
        output_dir = "/tmp/capture"
        flush_interval_secs = 1
        "#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.connection.app_name, "capture_b");
    assert_eq!(config.publisher_config().flush_interval, Duration::from_secs(1));
    assert_eq!(config.publisher_config().buffer_size, 1000);
}

#[test]
fn test_config_round_trips_through_toml() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed: Config = toml::from_str(&rendered).unwrap();

    assert_eq!(reparsed.connection, config.connection);
    assert_eq!(reparsed.streams, config.streams);
    assert_eq!(reparsed.revisions.path, config.revisions.path);
}

#[test]
fn test_config_rejects_bad_log_format() {
    let result: Result<Config, _> = toml::from_str(
        r#"
        [connection]
        host = "127.0.0.1"
        port = 4001
        app_name = "capture"

        [telemetry]
        log_format = "xml"
        "#,
    );
    assert!(result.is_err());
}

//! Comprehensive unit tests for config.rs module

use std::io::Write;
use std::time::Duration;
use zesty_ops::config::{AppConfig, BackendConfig, FeedConfig, LoggingConfig};

#[test]
fn test_default_backend_config() {
    let config = AppConfig::default();

    assert_eq!(config.backend.url, "http://localhost:54321");
    assert_eq!(config.backend.anon_key, "");
    assert_eq!(config.backend.request_timeout_secs, 15);
    assert_eq!(config.backend.realtime_timeout_secs, 10);
    assert_eq!(config.backend.storage_bucket, "incident-images");
}

#[test]
fn test_default_logging_config() {
    let config = AppConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.file_path, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_default_feed_config() {
    let config = AppConfig::default();

    assert_eq!(config.feed.page_size, 5);
    assert_eq!(config.feed_poll_interval(), Duration::from_secs(5));
    assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
    assert_eq!(config.resolve_return_delay(), Duration::from_millis(1500));
}

#[test]
fn test_default_messaging_config() {
    let config = AppConfig::default();

    assert_eq!(config.messaging_poll_interval(), Duration::from_secs(5));
    assert_eq!(config.messaging.max_message_length, 2000);
    assert_eq!(config.messaging.preview_length, 80);
}

#[test]
fn test_config_validation_success() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_bad_url() {
    let mut config = AppConfig::default();
    config.backend.url = "not a url".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_non_http_url() {
    let mut config = AppConfig::default();
    config.backend.url = "ftp://zoo.example.org".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_zero_timeouts() {
    let mut config = AppConfig::default();
    config.backend.request_timeout_secs = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.backend.realtime_timeout_secs = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.feed.fetch_timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_zero_poll_intervals() {
    let mut config = AppConfig::default();
    config.feed.poll_interval_secs = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.messaging.poll_interval_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_zero_page_size() {
    let mut config = AppConfig::default();
    config.feed.page_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_zero_resolve_delay_is_allowed() {
    let mut config = AppConfig::default();
    config.feed.resolve_return_delay_ms = 0;
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_empty_bucket() {
    let mut config = AppConfig::default();
    config.backend.storage_bucket = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_invalid_log_level() {
    let mut config = AppConfig::default();
    config.logging.level = "invalid".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_valid_log_levels() {
    let valid_levels = vec!["trace", "debug", "info", "warn", "error"];
    for level in valid_levels {
        let mut config = AppConfig::default();
        config.logging.level = level.to_string();
        assert!(config.validate().is_ok(), "Failed for level: {}", level);
    }
}

#[test]
fn test_config_validation_invalid_log_format() {
    let mut config = AppConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_valid_log_formats() {
    let valid_formats = vec!["text", "json"];
    for format in valid_formats {
        let mut config = AppConfig::default();
        config.logging.format = format.to_string();
        assert!(config.validate().is_ok(), "Failed for format: {}", format);
    }
}

#[test]
fn test_config_validation_empty_session_file() {
    let mut config = AppConfig::default();
    config.session.session_file = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_session_path() {
    let mut config = AppConfig::default();
    config.session.session_file = "/tmp/zesty/session.json".to_string();
    assert_eq!(config.session_path(), std::path::PathBuf::from("/tmp/zesty/session.json"));
}

#[test]
fn test_load_from_file_overrides_defaults() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "feed:\n  page_size: 8\n  resolve_return_delay_ms: 0\nlogging:\n  format: json").unwrap();

    let config = AppConfig::load_from(Some(file.path())).unwrap();

    assert_eq!(config.feed.page_size, 8);
    assert_eq!(config.resolve_return_delay(), Duration::ZERO);
    assert_eq!(config.logging.format, "json");
    // untouched sections keep their defaults
    assert_eq!(config.messaging.preview_length, 80);
    assert_eq!(config.backend.storage_bucket, "incident-images");
}

#[test]
fn test_load_from_rejects_invalid_file_values() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "feed:\n  page_size: 0").unwrap();

    assert!(AppConfig::load_from(Some(file.path())).is_err());
}

#[test]
fn test_load_from_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(AppConfig::load_from(Some(&dir.path().join("absent.yaml"))).is_err());
}

#[test]
fn test_yaml_round_trip_keeps_sections() {
    let yaml = AppConfig::default().to_yaml().unwrap();
    assert!(yaml.contains("backend:"));
    assert!(yaml.contains("feed:"));
    assert!(yaml.contains("messaging:"));
    assert!(yaml.contains("session:"));
}

#[test]
fn test_yaml_masks_anon_key() {
    let mut config = AppConfig::default();
    config.backend.anon_key = "eyJhbGciOiJIUzI1NiJ9.secret".to_string();
    let yaml = config.to_yaml().unwrap();
    assert!(!yaml.contains("secret"));
    assert!(yaml.contains("********"));
}

#[test]
fn test_backend_config_clone() {
    let config = BackendConfig {
        url: "https://zoo.supabase.co".to_string(),
        anon_key: "anon".to_string(),
        request_timeout_secs: 5,
        realtime_timeout_secs: 5,
        storage_bucket: "photos".to_string(),
    };
    let cloned = config.clone();
    assert_eq!(config.url, cloned.url);
    assert_eq!(config.storage_bucket, cloned.storage_bucket);
}

#[test]
fn test_logging_config_with_file_path() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        file_path: Some("/var/log/zesty.log".to_string()),
        format: "json".to_string(),
    };
    assert!(config.file_path.is_some());
}

#[test]
fn test_feed_config_boundary_values() {
    let mut config = AppConfig::default();
    config.feed = FeedConfig {
        page_size: 1,
        poll_interval_secs: 1,
        fetch_timeout_secs: 1,
        resolve_return_delay_ms: 0,
    };
    config.messaging.max_message_length = 1;
    config.messaging.preview_length = 1;

    assert!(config.validate().is_ok());
}

#[test]
fn test_config_debug_format() {
    let config = AppConfig::default();
    let debug_str = format!("{:?}", config);
    assert!(debug_str.contains("AppConfig"));
}

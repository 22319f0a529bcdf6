use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
    pub feed: FeedConfig,
    pub messaging: MessagingConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub request_timeout_secs: u64,
    pub realtime_timeout_secs: u64,
    pub storage_bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub page_size: usize,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub resolve_return_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    pub poll_interval_secs: u64,
    pub max_message_length: usize,
    pub preview_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                url: "http://localhost:54321".to_string(),
                anon_key: String::new(),
                request_timeout_secs: 15,
                realtime_timeout_secs: 10,
                storage_bucket: "incident-images".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            feed: FeedConfig {
                page_size: 5,
                poll_interval_secs: 5,
                fetch_timeout_secs: 10,
                resolve_return_delay_ms: 1500,
            },
            messaging: MessagingConfig {
                poll_interval_secs: 5,
                max_message_length: 2000,
                preview_length: 80,
            },
            session: SessionConfig {
                session_file: ".zesty/session.json".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Same as [`AppConfig::load`], with an optional explicit file layered last
    pub fn load_from(extra_file: Option<&std::path::Path>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| anyhow::anyhow!("Failed to encode default configuration: {}", e))?;

        let mut builder = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("zesty").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // ZESTY__FEED__PAGE_SIZE=10 and friends
            .add_source(Environment::with_prefix("ZESTY").separator("__"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let mut app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.apply_env_overrides();
        app_config.validate()?;

        Ok(app_config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.backend.url = url;
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            self.backend.anon_key = key;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate backend config
        let url = url::Url::parse(&self.backend.url)
            .map_err(|e| anyhow::anyhow!("Invalid backend url {}: {}", self.backend.url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!(
                "Backend url must be http or https, got {}",
                url.scheme()
            ));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("request_timeout_secs must be greater than 0"));
        }
        if self.backend.realtime_timeout_secs == 0 {
            return Err(anyhow::anyhow!("realtime_timeout_secs must be greater than 0"));
        }
        if self.backend.storage_bucket.trim().is_empty() {
            return Err(anyhow::anyhow!("storage_bucket cannot be empty"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate feed config
        if self.feed.page_size == 0 {
            return Err(anyhow::anyhow!("page_size must be greater than 0"));
        }
        if self.feed.poll_interval_secs == 0 {
            return Err(anyhow::anyhow!("feed poll_interval_secs must be greater than 0"));
        }
        if self.feed.fetch_timeout_secs == 0 {
            return Err(anyhow::anyhow!("fetch_timeout_secs must be greater than 0"));
        }

        // Validate messaging config
        if self.messaging.poll_interval_secs == 0 {
            return Err(anyhow::anyhow!("messaging poll_interval_secs must be greater than 0"));
        }
        if self.messaging.max_message_length == 0 {
            return Err(anyhow::anyhow!("max_message_length must be greater than 0"));
        }
        if self.messaging.preview_length == 0 {
            return Err(anyhow::anyhow!("preview_length must be greater than 0"));
        }

        if self.session.session_file.trim().is_empty() {
            return Err(anyhow::anyhow!("session_file cannot be empty"));
        }

        Ok(())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    pub fn session_path(&self) -> PathBuf {
        PathBuf::from(&self.session.session_file)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    pub const fn realtime_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.realtime_timeout_secs)
    }

    pub const fn feed_poll_interval(&self) -> Duration {
        Duration::from_secs(self.feed.poll_interval_secs)
    }

    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.fetch_timeout_secs)
    }

    pub const fn resolve_return_delay(&self) -> Duration {
        Duration::from_millis(self.feed.resolve_return_delay_ms)
    }

    pub const fn messaging_poll_interval(&self) -> Duration {
        Duration::from_secs(self.messaging.poll_interval_secs)
    }

    /// Render the effective configuration as YAML, with the anon key masked
    pub fn to_yaml(&self) -> Result<String> {
        let mut shown = self.clone();
        if !shown.backend.anon_key.is_empty() {
            shown.backend.anon_key = "********".to_string();
        }
        Ok(serde_yaml::to_string(&shown)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.backend.url, "http://localhost:54321");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.feed.page_size, 5);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.feed.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_masks_anon_key() {
        let mut config = AppConfig::default();
        config.backend.anon_key = "secret-key".to_string();
        let yaml = config.to_yaml().unwrap();
        assert!(!yaml.contains("secret-key"));
        assert!(yaml.contains("page_size: 5"));
    }
}

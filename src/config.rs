use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub checker: CheckerConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub user_agent: String,
    pub accept_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub page_load_timeout_secs: u64,
    pub body_wait_secs: u64,
    pub settle_delay_secs: u64,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
    pub accept_language: String,
    pub chrome_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    pub interval_minutes: u64,
    pub render_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "PRICEWATCH_"
            .add_source(Environment::with_prefix("PRICEWATCH").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate storage configuration
        if self.storage.data_dir.trim().is_empty() {
            return Err(ConfigError::Message(
                "Storage data_dir must not be empty".into(),
            ));
        }

        // Validate HTTP fetcher configuration
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "HTTP request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.http.max_retries == 0 {
            return Err(ConfigError::Message(
                "HTTP max_retries must be greater than 0".into(),
            ));
        }

        // Validate browser configuration
        if self.browser.page_load_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Browser page_load_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(ConfigError::Message(
                "Browser window size must be greater than 0".into(),
            ));
        }

        // Validate checker configuration
        if self.checker.interval_minutes == 0 {
            return Err(ConfigError::Message(
                "Checker interval_minutes must be greater than 0".into(),
            ));
        }

        // Validate metrics configuration
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message(
                "Metrics port must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

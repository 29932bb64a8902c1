use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::monitor::MonitorTimings;

/// Runtime configuration for the feed filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Change monitor timings
    pub monitor: MonitorConfig,

    /// Filter settings storage
    pub settings: SettingsConfig,

    /// Logging
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Trailing-edge debounce for card additions (ms)
    pub debounce_ms: u64,

    /// Follow-up scan after a feed swap (ms)
    pub settle_ms: u64,

    /// Location poll interval (ms)
    pub url_poll_ms: u64,

    /// Delay before the first startup scan (ms)
    pub startup_delay_ms: u64,

    /// Interval between startup retries while the feed is empty (ms)
    pub retry_interval_ms: u64,

    /// Startup retries before giving up
    pub retry_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// TOML file holding the `[ytf_settings]` table; in-memory store when unset
    pub path: Option<PathBuf>,

    /// How often the settings file is checked for changes (ms)
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is not set
    pub level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            settle_ms: 500,
            url_poll_ms: 500,
            startup_delay_ms: 200,
            retry_interval_ms: 300,
            retry_attempts: 15,
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn timings(&self) -> MonitorTimings {
        MonitorTimings {
            debounce: Duration::from_millis(self.debounce_ms),
            settle: Duration::from_millis(self.settle_ms),
            url_poll: Duration::from_millis(self.url_poll_ms),
            startup_delay: Duration::from_millis(self.startup_delay_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            retry_attempts: self.retry_attempts,
        }
    }
}

impl SettingsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl AppConfig {
    /// Load configuration from the first config file found, then apply
    /// environment overrides. Falls back to defaults.
    pub fn load() -> Result<Self> {
        let config_paths = ["ytf.toml", "config/ytf.toml"];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<AppConfig>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config file {}: {}", path.display(), e))?;
        let config: AppConfig = toml::from_str(&config_str)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config.with_env_overrides())
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_number("YTF_DEBOUNCE_MS") {
            self.monitor.debounce_ms = ms;
        }
        if let Some(ms) = env_number("YTF_SETTLE_MS") {
            self.monitor.settle_ms = ms;
        }
        if let Some(ms) = env_number("YTF_URL_POLL_MS") {
            self.monitor.url_poll_ms = ms;
        }
        if let Some(attempts) = env_number("YTF_RETRY_ATTEMPTS") {
            self.monitor.retry_attempts = attempts;
        }
        if let Ok(path) = std::env::var("YTF_SETTINGS_PATH") {
            self.settings.path = Some(PathBuf::from(path));
        }
        if let Ok(level) = std::env::var("YTF_LOG_LEVEL") {
            self.logging.level = level;
        }
        self
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.monitor.debounce_ms == 0 {
            return Err(anyhow!("debounce_ms must be greater than 0"));
        }

        if self.monitor.url_poll_ms == 0 {
            return Err(anyhow!("url_poll_ms must be greater than 0"));
        }

        if self.monitor.retry_interval_ms == 0 && self.monitor.retry_attempts > 0 {
            return Err(anyhow!(
                "retry_interval_ms must be greater than 0 when retries are enabled"
            ));
        }

        if self.settings.path.is_some() && self.settings.poll_interval_ms == 0 {
            return Err(anyhow!("settings poll_interval_ms must be greater than 0"));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Feed Filter Configuration:\n\
            - Debounce: {}ms\n\
            - Settle: {}ms\n\
            - URL Poll: {}ms\n\
            - Startup: {}ms, {} retries every {}ms\n\
            - Settings: {}",
            self.monitor.debounce_ms,
            self.monitor.settle_ms,
            self.monitor.url_poll_ms,
            self.monitor.startup_delay_ms,
            self.monitor.retry_attempts,
            self.monitor.retry_interval_ms,
            self.settings
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in memory".to_string()),
        )
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring non-numeric {}={}", name, value);
            None
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.config.monitor.debounce_ms = ms;
        self
    }

    pub fn with_settle_ms(mut self, ms: u64) -> Self {
        self.config.monitor.settle_ms = ms;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.monitor.retry_attempts = attempts;
        self
    }

    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.config.settings.path = Some(path);
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for AppConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

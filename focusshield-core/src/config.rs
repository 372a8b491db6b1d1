//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/focusshield/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/focusshield/` (~/.config/focusshield/)
//! - Data: `$XDG_DATA_HOME/focusshield/` (~/.local/share/focusshield/)
//! - State/Logs: `$XDG_STATE_HOME/focusshield/` (~/.local/state/focusshield/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding `remote.url`.
pub const REMOTE_URL_ENV: &str = "FOCUSSHIELD_REMOTE_URL";

/// Environment variable overriding `remote.anon_key`.
pub const REMOTE_KEY_ENV: &str = "FOCUSSHIELD_REMOTE_KEY";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Remote record store (optional; absent means local-only)
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Subscription tiers and the free report window
    #[serde(default)]
    pub billing: BillingConfig,

    /// Timer presets
    #[serde(default)]
    pub timer: TimerConfig,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote record store configuration
///
/// When both `url` and `anon_key` are set, records are merged with and
/// pushed to the signed-in user's account.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// Base URL of the REST endpoint (e.g., `https://project.example.com`)
    pub url: Option<String>,

    /// Public API key sent as `apikey` and bearer token
    pub anon_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            timeout_secs: default_remote_timeout(),
        }
    }
}

fn default_remote_timeout() -> u64 {
    30
}

impl RemoteConfig {
    /// Check if the remote store is configured
    pub fn is_ready(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
            && self.anon_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.url.is_none() && self.anon_key.is_none() {
            return Ok(());
        }

        match self.url.as_deref() {
            None => {
                return Err(Error::Config(
                    "remote.url is required when remote.anon_key is set".to_string(),
                ))
            }
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                return Err(Error::Config(format!(
                    "remote.url must start with http:// or https:// (got {url})"
                )))
            }
            Some(_) => {}
        }
        if self.anon_key.is_none() {
            return Err(Error::Config(
                "remote.anon_key is required when remote.url is set".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "remote.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `FOCUSSHIELD_REMOTE_URL` / `FOCUSSHIELD_REMOTE_KEY` overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(REMOTE_URL_ENV) {
            if !url.trim().is_empty() {
                self.url = Some(url);
            }
        }
        if let Ok(key) = std::env::var(REMOTE_KEY_ENV) {
            if !key.trim().is_empty() {
                self.anon_key = Some(key);
            }
        }
    }
}

/// Subscription and paywall configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Number of most recent weeks visible on the free plan
    #[serde(default = "default_free_tier_weeks")]
    pub free_tier_weeks: u32,

    /// Price id of the Pro plan
    pub pro_price_id: Option<String>,

    /// Price id of the Pro+ plan
    pub pro_plus_price_id: Option<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            free_tier_weeks: default_free_tier_weeks(),
            pro_price_id: None,
            pro_plus_price_id: None,
        }
    }
}

fn default_free_tier_weeks() -> u32 {
    2
}

/// Timer presets in minutes
#[derive(Debug, Deserialize, Clone)]
pub struct TimerConfig {
    #[serde(default = "default_pomodoro_minutes")]
    pub pomodoro_minutes: u32,

    #[serde(default = "default_long_minutes")]
    pub long_minutes: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            pomodoro_minutes: default_pomodoro_minutes(),
            long_minutes: default_long_minutes(),
        }
    }
}

fn default_pomodoro_minutes() -> u32 {
    25
}

fn default_long_minutes() -> u32 {
    50
}

/// Report window configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    /// Number of weeks generated, counting back from the current week
    #[serde(default = "default_report_weeks")]
    pub weeks: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            weeks: default_report_weeks(),
        }
    }
}

fn default_report_weeks() -> u32 {
    12
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    ///
    /// Remote env overrides are applied on top of the file (or defaults).
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.remote.apply_env();
        config.remote.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/focusshield/config.toml` (~/.config/focusshield/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("focusshield").join("config.toml")
    }

    /// Returns the data directory path (local document, auth session)
    ///
    /// `$XDG_DATA_HOME/focusshield/` (~/.local/share/focusshield/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("focusshield")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/focusshield/` (~/.local/state/focusshield/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("focusshield")
    }

    /// Returns the auth session file path
    pub fn session_path() -> PathBuf {
        Self::data_dir().join("session.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/focusshield/focusshield.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("focusshield.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.remote.is_ready());
        assert_eq!(config.billing.free_tier_weeks, 2);
        assert_eq!(config.timer.pomodoro_minutes, 25);
        assert_eq!(config.timer.long_minutes, 50);
        assert_eq!(config.report.weeks, 12);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[remote]
url = "https://project.example.com"
anon_key = "public-anon-key"

[billing]
free_tier_weeks = 4
pro_price_id = "price_pro"
pro_plus_price_id = "price_plus"

[timer]
pomodoro_minutes = 30

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert!(config.remote.is_ready());
        assert_eq!(config.remote.timeout_secs, 30);
        assert_eq!(config.billing.free_tier_weeks, 4);
        assert_eq!(config.billing.pro_price_id.as_deref(), Some("price_pro"));
        assert_eq!(config.billing.pro_plus_price_id.as_deref(), Some("price_plus"));
        assert_eq!(config.timer.pomodoro_minutes, 30);
        assert_eq!(config.timer.long_minutes, 50);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_remote_config_validation() {
        // Unconfigured remote is valid (local-only)
        assert!(RemoteConfig::default().validate().is_ok());

        let config = RemoteConfig {
            url: Some("https://project.example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RemoteConfig {
            url: Some("project.example.com".to_string()),
            anon_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RemoteConfig {
            url: Some("https://project.example.com".to_string()),
            anon_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_ready());
    }

    #[test]
    fn test_blank_remote_is_not_ready() {
        let config = RemoteConfig {
            url: Some("  ".to_string()),
            anon_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(!config.is_ready());
    }
}

//! Configuration management
//!
//! Settings are layered, later layers win:
//! - built-in defaults
//! - optional TOML file in the OS config directory
//! - process environment (a `.env` file is loaded into it by the binary)
//! - command-line flags, applied by the caller

use crate::error::{OverseerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const API_URL_ENV: &str = "TELEGRAM_API_URL";
pub const API_TOKEN_ENV: &str = "TELEGRAM_API_TOKEN";
pub const CHECK_INTERVAL_ENV: &str = "OVERSEER_CHECK_INTERVAL";
pub const DATA_DIR_ENV: &str = "OVERSEER_DATA_DIR";

const APP_DIR: &str = "overseer";
const SUBSCRIBER_FILE: &str = "chat_ids.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverseerConfig {
    pub telegram: TelegramConfig,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_url: Option<String>,
    #[serde(skip_serializing)] // Never write the token back to disk
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

/// Validated connection settings for the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramEndpoint {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            timeout_secs: 10,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 1,
        }
    }
}

impl OverseerConfig {
    /// Load the config file (if any) and overlay the process environment.
    pub async fn load() -> Result<Self> {
        let mut config = match Self::config_file_path() {
            Some(path) => Self::load_file(&path).await?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file, falling back to defaults when it does not exist.
    pub async fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            OverseerError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: OverseerConfig = toml::from_str(&content).map_err(|e| {
            OverseerError::configuration(format!("invalid {}: {}", path.display(), e))
        })?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Overlay values found through `lookup`, normally `std::env::var`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV) {
            self.telegram.api_url = Some(url);
        }
        if let Some(token) = lookup(API_TOKEN_ENV) {
            self.telegram.api_token = Some(token);
        }
        if let Some(interval) = lookup(CHECK_INTERVAL_ENV) {
            self.monitor.check_interval_secs = interval.trim().parse().map_err(|_| {
                OverseerError::configuration(format!(
                    "{} must be a whole number of seconds, got {:?}",
                    CHECK_INTERVAL_ENV, interval
                ))
            })?;
        }
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Both the API URL and the token are mandatory before any command runs.
    pub fn telegram_endpoint(&self) -> Result<TelegramEndpoint> {
        let base_url = non_empty(self.telegram.api_url.as_deref())
            .ok_or_else(|| OverseerError::configuration(format!("{} is not set!", API_URL_ENV)))?;
        let token = non_empty(self.telegram.api_token.as_deref())
            .ok_or_else(|| OverseerError::configuration(format!("{} is not set!", API_TOKEN_ENV)))?;

        Ok(TelegramEndpoint {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout: Duration::from_secs(self.telegram.timeout_secs.max(1)),
        })
    }

    /// Polling interval; zero would turn the monitor into a busy loop.
    pub fn check_interval(&self) -> Result<Duration> {
        if self.monitor.check_interval_secs == 0 {
            return Err(OverseerError::configuration(
                "check interval must be at least one second",
            ));
        }
        Ok(Duration::from_secs(self.monitor.check_interval_secs))
    }

    /// Location of the persisted subscriber set.
    pub fn subscriber_file_path(&self) -> Result<PathBuf> {
        let mut path = match &self.storage.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| OverseerError::configuration("Could not find data directory"))?,
        };

        path.push(APP_DIR);
        path.push(SUBSCRIBER_FILE);
        Ok(path)
    }

    /// OS-specific config file path, if the platform has a config directory.
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push(APP_DIR);
            path.push("config.toml");
            path
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = OverseerConfig::default();
        assert_eq!(config.monitor.check_interval_secs, 1);
        assert_eq!(config.telegram.timeout_secs, 10);
        assert!(config.telegram.api_url.is_none());
    }

    #[test]
    fn test_missing_url_is_configuration_error() {
        let mut config = OverseerConfig::default();
        config.apply_env(env(&[(API_TOKEN_ENV, "123:abc")])).unwrap();

        let err = config.telegram_endpoint().unwrap_err();
        assert!(matches!(err, OverseerError::Configuration { .. }));
        assert!(err.to_string().contains(API_URL_ENV));
    }

    #[test]
    fn test_missing_token_is_configuration_error() {
        let mut config = OverseerConfig::default();
        config
            .apply_env(env(&[(API_URL_ENV, "https://api.telegram.org")]))
            .unwrap();

        let err = config.telegram_endpoint().unwrap_err();
        assert!(err.to_string().contains(API_TOKEN_ENV));
    }

    #[test]
    fn test_blank_token_rejected() {
        let mut config = OverseerConfig::default();
        config
            .apply_env(env(&[
                (API_URL_ENV, "https://api.telegram.org"),
                (API_TOKEN_ENV, "   "),
            ]))
            .unwrap();
        assert!(config.telegram_endpoint().is_err());
    }

    #[test]
    fn test_endpoint_from_env() {
        let mut config = OverseerConfig::default();
        config
            .apply_env(env(&[
                (API_URL_ENV, "https://api.telegram.org/"),
                (API_TOKEN_ENV, "123:abc"),
                (CHECK_INTERVAL_ENV, "30"),
            ]))
            .unwrap();

        let endpoint = config.telegram_endpoint().unwrap();
        assert_eq!(endpoint.base_url, "https://api.telegram.org");
        assert_eq!(endpoint.token, "123:abc");
        assert_eq!(endpoint.timeout, Duration::from_secs(10));
        assert_eq!(config.check_interval().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = OverseerConfig::default();
        config.monitor.check_interval_secs = 0;
        assert!(matches!(
            config.check_interval(),
            Err(OverseerError::Configuration { .. })
        ));
    }

    #[test]
    fn test_bad_interval_rejected() {
        let mut config = OverseerConfig::default();
        let err = config
            .apply_env(env(&[(CHECK_INTERVAL_ENV, "soon")]))
            .unwrap_err();
        assert!(matches!(err, OverseerError::Configuration { .. }));
    }

    #[test]
    fn test_subscriber_file_path_override() {
        let mut config = OverseerConfig::default();
        config.apply_env(env(&[(DATA_DIR_ENV, "/srv/state")])).unwrap();

        let path = config.subscriber_file_path().unwrap();
        assert_eq!(path, PathBuf::from("/srv/state/overseer/chat_ids.json"));
    }

    #[tokio::test]
    async fn test_load_file_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            "[telegram]\napi_url = \"http://localhost:8081\"\ntimeout_secs = 5\n\n[monitor]\ncheck_interval_secs = 15\n",
        )
        .await
        .unwrap();

        let config = OverseerConfig::load_file(&path).await.unwrap();
        assert_eq!(config.telegram.api_url.as_deref(), Some("http://localhost:8081"));
        assert_eq!(config.telegram.timeout_secs, 5);
        assert_eq!(config.monitor.check_interval_secs, 15);
        assert!(config.storage.data_dir.is_none());
    }

    #[tokio::test]
    async fn test_load_file_missing_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = OverseerConfig::load_file(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config.monitor.check_interval_secs, 1);
    }

    #[test]
    fn test_token_never_serialized() {
        let mut config = OverseerConfig::default();
        config.telegram.api_token = Some("secret".to_string());
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("secret"));
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::{atomic_write, FileStorage};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Supabase project settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Project URL, e.g. https://<ref>.supabase.co
    pub url: String,

    /// Public anon key sent as `apikey`
    pub anon_key: String,

    /// Edge function that verifies kid PINs
    #[serde(default = "default_kid_login_function")]
    pub kid_login_function: String,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// Session persistence and guard settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Where the session document lives (platform default if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// How long the route guard waits for the auth backend (milliseconds)
    #[serde(default = "default_auth_check_timeout_ms")]
    pub auth_check_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_kid_login_function() -> String {
    "kid-login".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_auth_check_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            state_file: None,
            auth_check_timeout_ms: default_auth_check_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SessionSettings {
    pub fn auth_check_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_check_timeout_ms)
    }

    /// Resolved session file location
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(path) => Ok(path.clone()),
            None => FileStorage::default_path(),
        }
    }
}

impl AppConfig {
    /// Minimal configuration for a backend
    pub fn new(url: String, anon_key: String) -> Self {
        Self {
            backend: BackendConfig {
                url,
                anon_key,
                kid_login_function: default_kid_login_function(),
                request_timeout: default_request_timeout(),
            },
            session: SessionSettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self).context("Failed to serialize config")?;

        atomic_write(path, toml.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.backend.url).context("Invalid backend URL")?;

        let is_loopback = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"));
        if url.scheme() != "https" && !(url.scheme() == "http" && is_loopback) {
            anyhow::bail!(
                "Backend URL must use HTTPS (got: {}). Plain HTTP is only allowed for localhost.",
                url.scheme()
            );
        }

        if self.backend.anon_key.trim().is_empty() {
            anyhow::bail!("Backend anon_key must not be empty");
        }

        if self.backend.kid_login_function.trim().is_empty() {
            anyhow::bail!("kid_login_function must not be empty");
        }

        if self.backend.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.session.auth_check_timeout_ms == 0 {
            anyhow::bail!("auth_check_timeout_ms must be greater than 0");
        }

        Ok(())
    }
}

/// Get the platform-specific config file path
pub fn get_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "family-growth")
        .context("Could not determine config file location")?;

    let mut path = dirs.config_dir().to_path_buf();
    path.push("config.toml");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [backend]
            url = "https://abc.supabase.co"
            anon_key = "anon"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.kid_login_function, "kid-login");
        assert_eq!(config.backend.request_timeout, 30);
        assert_eq!(config.session.auth_check_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.level, "info");
        assert!(config.session.state_file.is_none());
    }

    #[test]
    fn test_rejects_plain_http() {
        let config = AppConfig::new("http://abc.supabase.co".to_string(), "anon".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allows_http_on_localhost() {
        let config = AppConfig::new("http://localhost:54321".to_string(), "anon".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_anon_key() {
        let config = AppConfig::new("https://abc.supabase.co".to_string(), "  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = AppConfig::new("https://abc.supabase.co".to_string(), "anon".to_string());
        config.session.auth_check_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("conf").join("config.toml");

        let mut config = AppConfig::new("https://abc.supabase.co".to_string(), "anon".to_string());
        config.session.state_file = Some(temp_dir.path().join("session.json"));
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.backend.url, config.backend.url);
        assert_eq!(loaded.session.state_file, config.session.state_file);
    }
}

//! Configuration management
//!
//! Values are resolved in order: built-in defaults, the YAML file, then
//! `PIA_*` environment variables. CLI flags are applied last by the binary.

use crate::error::{PiaError, Result};
use crate::request::Limits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://mcp.programintegrity.org/";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Endpoint of the remote PIA server
    pub api_url: String,

    /// Sent as `x-api-key` on every backend call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-attempt timeout
    pub request_timeout_secs: u64,

    pub default_page_size: u32,

    /// Page size ceiling; larger requests are clamped
    pub max_page_size: u32,

    pub rate_limit: RateLimitConfig,

    pub retry: RetryConfig,

    /// Reject filters naming fields outside the known schema
    pub strict_fields: bool,

    /// Upper bound on tool calls served at once
    pub max_concurrent_calls: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            request_timeout_secs: 60,
            default_page_size: crate::request::DEFAULT_PAGE_SIZE,
            max_page_size: crate::request::MAX_PAGE_SIZE,
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            strict_fields: false,
            max_concurrent_calls: 16,
        }
    }
}

/// Fixed-window rate limit settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 30,
        }
    }
}

/// Backoff settings for transient backend failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 250,
            max_delay_ms: 4000,
            multiplier: 2.0,
        }
    }
}

impl Config {
    /// Load config from `path` (or the default path), then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);
        let mut config = Self::from_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                return Ok(Config::default());
            }
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Override fields from `PIA_*` variables found through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("PIA_API_URL") {
            self.api_url = url;
        }
        if let Some(key) = get("PIA_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(v) = get("PIA_REQUEST_TIMEOUT") {
            self.request_timeout_secs = parse_env("PIA_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = get("PIA_DEFAULT_PAGE_SIZE") {
            self.default_page_size = parse_env("PIA_DEFAULT_PAGE_SIZE", &v)?;
        }
        if let Some(v) = get("PIA_MAX_RESULTS") {
            self.max_page_size = parse_env("PIA_MAX_RESULTS", &v)?;
        }
        if let Some(v) = get("PIA_RATE_LIMIT_WINDOW") {
            self.rate_limit.window_secs = parse_env("PIA_RATE_LIMIT_WINDOW", &v)?;
        }
        if let Some(v) = get("PIA_RATE_LIMIT_MAX") {
            self.rate_limit.max_requests = parse_env("PIA_RATE_LIMIT_MAX", &v)?;
        }
        if let Some(v) = get("PIA_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("PIA_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("PIA_STRICT_FIELDS") {
            self.strict_fields = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(PiaError::Config(format!(
                        "PIA_STRICT_FIELDS must be a boolean, got '{}'",
                        v
                    )))
                }
            };
        }
        Ok(())
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.api_url.trim().is_empty(), "api_url must not be empty"),
            (self.request_timeout_secs == 0, "request_timeout_secs must be >= 1"),
            (self.default_page_size == 0, "default_page_size must be >= 1"),
            (self.max_page_size == 0, "max_page_size must be >= 1"),
            (self.rate_limit.window_secs == 0, "rate_limit.window_secs must be >= 1"),
            (self.retry.max_attempts == 0, "retry.max_attempts must be >= 1"),
            (self.retry.multiplier < 1.0, "retry.multiplier must be >= 1.0"),
            (self.max_concurrent_calls == 0, "max_concurrent_calls must be >= 1"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(PiaError::Config(message.to_string())),
            None => Ok(()),
        }
    }

    /// API key, required before any backend call
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PiaError::Config(
                    "API key is required. Pass --api-key or set PIA_API_KEY".to_string(),
                )
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PiaError::Config(format!("{} has an invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.rate_limit.max_requests, 30);
        assert_eq!(config.retry.max_attempts, 4);
        assert!(!config.strict_fields);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_file(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            "max_page_size: 25\nrate_limit:\n  max_requests: 5\nretry:\n  max_attempts: 2\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.max_page_size, 25);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_delay_ms, 250);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yml");
        let mut config = Config::default();
        config.strict_fields = true;
        config.save(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config {
            max_page_size: 25,
            ..Config::default()
        };
        config
            .apply_env(env(&[
                ("PIA_MAX_RESULTS", "40"),
                ("PIA_API_KEY", "secret"),
                ("PIA_STRICT_FIELDS", "true"),
                ("PIA_RATE_LIMIT_WINDOW", "10"),
            ]))
            .unwrap();
        assert_eq!(config.max_page_size, 40);
        assert_eq!(config.require_api_key().unwrap(), "secret");
        assert!(config.strict_fields);
        assert_eq!(config.rate_limit.window_secs, 10);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("PIA_MAX_ATTEMPTS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("PIA_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = Config {
            max_page_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let err = Config::default().require_api_key().unwrap_err();
        assert!(err.to_string().contains("PIA_API_KEY"));
    }
}

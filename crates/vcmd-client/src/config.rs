//! Client configuration
//!
//! Loaded from TOML, then overridden by `VCMD_`-prefixed environment
//! variables, then validated. Every field has a default so an empty file is a
//! valid configuration apart from the key path.

use crate::error::ConfigError;
use crate::transport::DEFAULT_RELAY_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use vcmd_protocol::RetryPolicy;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "VCMD_";

/// Settings for a command client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay base URL
    pub relay_base_url: String,
    /// PEM file holding the client's P-256 private key
    pub private_key_path: Option<PathBuf>,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub base_timeout_ms: u64,
    /// Upper bound on a single retry delay, in milliseconds
    pub max_timeout_ms: u64,
    /// HTTP request timeout, in milliseconds
    pub request_timeout_ms: u64,
    /// Command lifetime used when the caller does not pick one
    pub default_expiration_secs: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_base_url: DEFAULT_RELAY_URL.to_string(),
            private_key_path: None,
            max_retries: 4,
            base_timeout_ms: 1000,
            max_timeout_ms: 30_000,
            request_timeout_ms: 30_000,
            default_expiration_secs: 15,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl ClientConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Read and parse a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Load a file, apply the process environment and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `VCMD_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `VCMD_*` overrides from an explicit set of variables
    ///
    /// Unknown `VCMD_` keys are ignored.
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "RELAY_BASE_URL" => self.relay_base_url = value.to_string(),
                "PRIVATE_KEY_PATH" => self.private_key_path = Some(PathBuf::from(value)),
                "MAX_RETRIES" => self.max_retries = parse_env(key, value)?,
                "BASE_TIMEOUT_MS" => self.base_timeout_ms = parse_env(key, value)?,
                "MAX_TIMEOUT_MS" => self.max_timeout_ms = parse_env(key, value)?,
                "REQUEST_TIMEOUT_MS" => self.request_timeout_ms = parse_env(key, value)?,
                "DEFAULT_EXPIRATION_SECS" => self.default_expiration_secs = parse_env(key, value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay_base_url.trim().is_empty() {
            return Err(ConfigError::invalid("relay_base_url cannot be empty"));
        }
        if self.base_timeout_ms == 0 {
            return Err(ConfigError::invalid("base_timeout_ms cannot be 0"));
        }
        if self.max_timeout_ms < self.base_timeout_ms {
            return Err(ConfigError::invalid(
                "max_timeout_ms cannot be below base_timeout_ms",
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("request_timeout_ms cannot be 0"));
        }
        if self.default_expiration_secs == 0 {
            return Err(ConfigError::invalid("default_expiration_secs cannot be 0"));
        }
        Ok(())
    }

    /// Retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_timeout: Duration::from_millis(self.base_timeout_ms),
            max_timeout: Duration::from_millis(self.max_timeout_ms),
        }
    }

    /// HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

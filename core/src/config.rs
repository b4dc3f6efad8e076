//! Client configuration.
//!
//! A `Config` is an explicit value handed to the dispatcher at construction.
//! Nothing reads a process-wide global, so tests can point a client at a
//! local mock server by building a different `Config`.
//!
//! # Environment Variables
//!
//! - `WALLET_BASE_URL` — service base URL (default: `https://yoomoney.ru`)
//! - `WALLET_TIMEOUT_SECS` — transport timeout in seconds (default: `30`)

use std::num::ParseIntError;
use std::time::Duration;

use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://yoomoney.ru";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const BASE_URL_ENV: &str = "WALLET_BASE_URL";
pub const TIMEOUT_ENV: &str = "WALLET_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL {value:?}: {source}")]
    InvalidBaseUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("base URL must use http or https, got {0:?}")]
    UnsupportedScheme(String),

    #[error("invalid timeout {value:?}: {source}")]
    InvalidTimeout {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Immutable connection settings shared by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    base_url: String,
    timeout: Duration,
}

impl Config {
    /// Trailing slashes on `base_url` are stripped.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Load from `WALLET_BASE_URL` / `WALLET_TIMEOUT_SECS`, falling back to
    /// the defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let parsed = Url::parse(&base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            value: base_url.clone(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let mut config = Self::new(&base_url);
        if let Some(value) = lookup(TIMEOUT_ENV) {
            let secs = value
                .trim()
                .parse::<u64>()
                .map_err(|source| ConfigError::InvalidTimeout { value, source })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

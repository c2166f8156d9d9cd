//! Runtime configuration loaded from `VITRINE_*` environment variables.
//!
//! | Variable                          | Default          |
//! |-----------------------------------|------------------|
//! | `VITRINE_BIND_ADDR`               | `127.0.0.1:8080` |
//! | `VITRINE_CACHE_TTL_SECS`          | `30`             |
//! | `VITRINE_RATE_LIMIT_ENABLED`      | `true`           |
//! | `VITRINE_RATE_LIMIT_MAX_ENTRIES`  | `10000`          |
//! | `VITRINE_TRUST_PROXY_HEADERS`     | `false`          |
//! | `VITRINE_RATE_LIMITS`             | *(built-in policies)* |
//!
//! `VITRINE_RATE_LIMITS` is a JSON object overriding individual policies, e.g.
//! `{"login": {"max_requests": 10, "interval_secs": 600}}`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::DEFAULT_TTL;
use crate::rate_limit::{DEFAULT_MAX_ENTRIES, RateLimitPolicies};

/// Errors produced while building configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid rate limit: {reason}")]
    InvalidRateLimit { reason: &'static str },

    #[error("invalid rate-limit policies: {0}")]
    Policies(#[from] serde_json::Error),
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Lifetime of cached profile reads.
    pub cache_ttl: Duration,
    /// When `false`, rate-limit middleware lets every request through.
    pub rate_limit_enabled: bool,
    /// Tracked identifiers above which expired windows are swept.
    pub rate_limit_max_entries: usize,
    /// Whether `X-Forwarded-For` / `X-Real-IP` identify the client.
    /// Only enable behind a proxy that overwrites them.
    pub trust_proxy_headers: bool,
    /// Per-action limits.
    pub rate_limits: RateLimitPolicies,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_owned(),
            cache_ttl: DEFAULT_TTL,
            rate_limit_enabled: true,
            rate_limit_max_entries: DEFAULT_MAX_ENTRIES,
            trust_proxy_headers: false,
            rate_limits: RateLimitPolicies::default(),
        }
    }
}

impl Config {
    /// Builds configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any variable is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("VITRINE_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "VITRINE_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(enabled) = parse_bool(&lookup, "VITRINE_RATE_LIMIT_ENABLED")? {
            config.rate_limit_enabled = enabled;
        }
        if let Some(max) = parse_var(&lookup, "VITRINE_RATE_LIMIT_MAX_ENTRIES")? {
            config.rate_limit_max_entries = max;
        }
        if let Some(trust) = parse_bool(&lookup, "VITRINE_TRUST_PROXY_HEADERS")? {
            config.trust_proxy_headers = trust;
        }
        if let Some(json) = lookup("VITRINE_RATE_LIMITS") {
            config.rate_limits.merge_json(&json)?;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let parsed = raw.trim().parse::<T>();
    match parsed {
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(ConfigError::InvalidVar {
            name,
            reason: e.to_string(),
            value: raw,
        }),
    }
}

fn parse_bool<F>(lookup: &F, name: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidVar {
            name,
            value: raw,
            reason: "expected a boolean".to_owned(),
        }),
    }
}

//! Client configuration parsed from environment variables.

use serde::Serialize;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(String),
}

/// How concurrent authorization failures share credential refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Every failing request performs its own refresh call.
    #[default]
    PerRequest,
    /// Requests failing while a refresh is in flight wait for that refresh.
    Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to, without a trailing `/`.
    pub api_url: String,
    pub timeouts: Timeouts,
    pub refresh_policy: RefreshPolicy,
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: normalize_api_url(&api_url.into()),
            timeouts: Timeouts::default(),
            refresh_policy: RefreshPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `EMBLA_API_URL`: default `http://127.0.0.1:8000/api`
    /// - `EMBLA_REQUEST_TIMEOUT_SECS`: default 30
    /// - `EMBLA_CONNECT_TIMEOUT_SECS`: default 10
    /// - `EMBLA_REFRESH_POLICY`: `per-request` (default) or `coalesced`
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh policy is not recognized.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("EMBLA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let refresh_policy = parse_refresh_policy(std::env::var("EMBLA_REFRESH_POLICY").ok().as_deref())?;
        let timeouts = Timeouts {
            request_secs: env_parse_u64("EMBLA_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("EMBLA_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { api_url: normalize_api_url(&api_url), timeouts, refresh_policy })
    }
}

fn normalize_api_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn parse_refresh_policy(raw: Option<&str>) -> Result<RefreshPolicy, ConfigError> {
    match raw.map(str::trim).unwrap_or("per-request") {
        "per-request" | "" => Ok(RefreshPolicy::PerRequest),
        "coalesced" => Ok(RefreshPolicy::Coalesced),
        other => Err(ConfigError::Parse(format!(
            "unknown EMBLA_REFRESH_POLICY '{other}' (expected 'per-request' or 'coalesced')"
        ))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

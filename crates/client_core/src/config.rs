use std::time::Duration;

use anyhow::Result;
use storage::Storage;
use tracing::warn;
use url::Url;

use crate::tracking::{TrackingConfig, DEFAULT_API_KEY, DEFAULT_LOOKUP_TIMEOUT, DEFAULT_PROXY_URL};

pub const API_KEY_ENV: &str = "TRACKER_API_KEY";
pub const PROXY_URL_ENV: &str = "TRACKER_PROXY_URL";
pub const TIMEOUT_ENV: &str = "TRACKER_TIMEOUT_SECONDS";

/// Operator overrides for the tracking client. Unset fields fall back to
/// the built-in defaults when turned into a [`TrackingConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_key: Option<String>,
    pub proxy_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl ClientSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            api_key: non_empty(API_KEY_ENV),
            proxy_url: non_empty(PROXY_URL_ENV),
            timeout_seconds: non_empty(TIMEOUT_ENV).and_then(|v| v.parse().ok()),
        }
    }

    /// Persisted values win over the environment.
    pub async fn resolve(storage: &Storage) -> Result<TrackingConfig> {
        let persisted = Self {
            api_key: storage.api_key().await?,
            proxy_url: storage.proxy_url().await?,
            timeout_seconds: None,
        };
        Ok(persisted.or(Self::from_env()).into_tracking_config())
    }

    pub fn or(self, other: Self) -> Self {
        Self {
            api_key: self.api_key.or(other.api_key),
            proxy_url: self.proxy_url.or(other.proxy_url),
            timeout_seconds: self.timeout_seconds.or(other.timeout_seconds),
        }
    }

    pub fn into_tracking_config(self) -> TrackingConfig {
        TrackingConfig {
            api_key: self.api_key.unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
            proxy_url: self
                .proxy_url
                .map_or_else(|| DEFAULT_PROXY_URL.to_string(), |url| resolve_proxy_url(&url)),
            timeout: self
                .timeout_seconds
                .filter(|secs| *secs > 0)
                .map_or(DEFAULT_LOOKUP_TIMEOUT, Duration::from_secs),
        }
    }
}

/// Only absolute http(s) URLs are honoured; anything else means the default.
pub fn resolve_proxy_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => raw.trim().to_string(),
        _ => {
            warn!(proxy_url = raw, "ignoring proxy url that is not an absolute http(s) url");
            DEFAULT_PROXY_URL.to_string()
        }
    }
}

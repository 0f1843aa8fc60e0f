use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "proxy.toml";
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.trackingmore.com/v4/trackings/realtime";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    pub upstream_url: String,
    pub upstream_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".into(),
            upstream_url: DEFAULT_UPSTREAM_URL.into(),
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    upstream_url: Option<String>,
    upstream_timeout_seconds: Option<u64>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |name| std::env::var(name).ok())
}

/// File values override the defaults; environment values override both.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.bind_addr {
                    settings.bind_addr = v;
                }
                if let Some(v) = file_cfg.upstream_url {
                    settings.upstream_url = v;
                }
                if let Some(secs) = file_cfg.upstream_timeout_seconds.filter(|s| *s > 0) {
                    settings.upstream_timeout = Duration::from_secs(secs);
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring unreadable settings file");
            }
        }
    }

    if let Some(v) = env("PROXY_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("PROXY_UPSTREAM_URL") {
        settings.upstream_url = v;
    }
    if let Some(v) = env("PROXY_UPSTREAM_TIMEOUT_SECONDS") {
        match v.parse::<u64>() {
            Ok(secs) if secs > 0 => settings.upstream_timeout = Duration::from_secs(secs),
            _ => warn!(value = %v, "ignoring invalid PROXY_UPSTREAM_TIMEOUT_SECONDS"),
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

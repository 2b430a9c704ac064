use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Polling more often than this is refused at startup.
pub const MIN_INTERVAL_SECS: u64 = 10;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ── Source config ─────────────────────────────────────────────────────────────

/// Where page content comes from and how the hashed text is extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    /// JSON pointer (RFC 6901) selecting the text to hash from a JSON
    /// response body.  Empty hashes the raw body instead.
    pub content_pointer: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Query parameters appended to `url` on every request.
    pub query: BTreeMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let query = [
            ("action", "parse"),
            ("page", "Main_Page"),
            ("format", "json"),
            ("prop", "text"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            url: "https://en.wikipedia.org/w/api.php".to_string(),
            content_pointer: "/parse/text/*".to_string(),
            timeout_secs: 30,
            user_agent: concat!("pagewatch/", env!("CARGO_PKG_VERSION")).to_string(),
            query,
        }
    }
}

// ── Poll config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    /// Labels recorded with every detected change.
    pub labels: Vec<String>,
    /// Optional CSS selector.  When non-empty, the text of every matching
    /// element in the fetched content becomes a label; `labels` is used only
    /// when nothing matches.
    pub label_selector: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            labels: vec!["From today's featured article".to_string()],
            label_selector: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
    /// Keep at most this many records, dropping the oldest first.
    /// `0` (the default) never drops anything.
    pub max_updates: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "wiki_updates.json".to_string(),
            max_updates: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Also write logs to this file when non-empty.
    pub log_file: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("source url is empty")]
    MissingUrl,
    #[error("source url `{url}` is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("poll interval must be at least {min}s (got {0}s)", min = MIN_INTERVAL_SECS)]
    IntervalTooShort(u64),
    #[error("source timeout must be greater than zero")]
    ZeroTimeout,
    #[error("store path is empty")]
    MissingStorePath,
    #[error("content pointer `{0}` must be empty or start with `/`")]
    InvalidPointer(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub poll: PollConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Apply `PAGEWATCH_*` overrides.  Empty or unparseable values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("PAGEWATCH_URL") {
            self.source.url = url;
        }
        if let Some(secs) = get("PAGEWATCH_INTERVAL_SECS").and_then(|v| v.trim().parse().ok()) {
            self.poll.interval_secs = secs;
        }
        if let Some(path) = get("PAGEWATCH_DATA_FILE") {
            self.store.path = path;
        }
        if let Some(port) = get("PAGEWATCH_PORT").and_then(|v| v.trim().parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let raw = self.source.url.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        let parsed = url::Url::parse(raw).map_err(|err| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme `{}`", parsed.scheme()),
            });
        }

        if self.poll.interval_secs < MIN_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooShort(self.poll.interval_secs));
        }
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.store.path.trim().is_empty() {
            return Err(ConfigError::MissingStorePath);
        }

        let pointer = &self.source.content_pointer;
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(ConfigError::InvalidPointer(pointer.clone()));
        }

        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store.path)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

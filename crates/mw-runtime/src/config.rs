use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_STORAGE_ROOT: &str = "METRICS_STORAGE_ROOT";
pub const ENV_QUEUE_DIR: &str = "METRICS_QUEUE_DIR";
pub const ENV_QUEUE_ENABLED: &str = "METRICS_QUEUE_ENABLED";
pub const ENV_EVENTS_PATH: &str = "METRICS_EVENTS_PATH";
pub const ENV_HEARTBEAT_INTERVAL: &str = "WORKER_HEARTBEAT_INTERVAL_SECONDS";
pub const ENV_POLL_INTERVAL: &str = "METRICS_POLL_INTERVAL_MS";
pub const ENV_LOG_FILTER: &str = "RUST_LOG";
pub const ENV_LOG_FORMAT: &str = "METRICS_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected text or json, got {other}")),
        }
    }
}

/// Worker settings. Every field has a default; a JSON file may set any subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub storage_root: PathBuf,
    pub queue_dir: PathBuf,
    pub queue_enabled: bool,
    pub events_path: PathBuf,
    /// Accepted and validated for compatibility with existing deployments.
    /// A run publishes a single heartbeat after its read phase regardless
    /// of this value.
    pub heartbeat_interval_seconds: u64,
    pub poll_interval_ms: u64,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./data"),
            queue_dir: PathBuf::from("./queue"),
            queue_enabled: true,
            events_path: PathBuf::from("./events.jsonl"),
            heartbeat_interval_seconds: 30,
            poll_interval_ms: 1_000,
            log_filter: "info".to_owned(),
            log_format: LogFormat::Text,
        }
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_owned(),
            reason: "expected a boolean".to_owned(),
        }),
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value: raw.to_owned(),
            reason: err.to_string(),
        })
}

impl WorkerConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each known key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::default().overlay(lookup)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply environment-style overrides on top of `self`.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_STORAGE_ROOT) {
            self.storage_root = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_QUEUE_DIR) {
            self.queue_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_QUEUE_ENABLED) {
            self.queue_enabled = parse_bool(ENV_QUEUE_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_EVENTS_PATH) {
            self.events_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_HEARTBEAT_INTERVAL) {
            self.heartbeat_interval_seconds = parse_u64(ENV_HEARTBEAT_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL) {
            self.poll_interval_ms = parse_u64(ENV_POLL_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_FILTER) {
            self.log_filter = value;
        }
        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            self.log_format = value
                .parse()
                .map_err(|reason| ConfigError::InvalidValue {
                    key: ENV_LOG_FORMAT,
                    value: value.clone(),
                    reason,
                })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0"));
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_seconds must be > 0",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    #[must_use]
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    #[must_use]
    pub fn with_queue_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.queue_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_events_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.events_path = path.into();
        self
    }

    #[must_use]
    pub fn with_queue_enabled(mut self, enabled: bool) -> Self {
        self.queue_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }
}

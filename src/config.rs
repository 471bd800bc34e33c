use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use tracing_subscriber::EnvFilter;

/// Process configuration, read from `SLOTFINDER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub http_addr: String,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub slot_minutes: u32,
    /// `None` disables the storage read deadline.
    pub read_timeout: Option<Duration>,
    pub log_format: LogFormat,
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    ZeroSlotLength,
    UnknownLogFormat(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroSlotLength => write!(f, "SLOTFINDER_SLOT_MINUTES must be positive"),
            ConfigError::UnknownLogFormat(s) => {
                write!(f, "SLOTFINDER_LOG_FORMAT must be json or text, got {s:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparsable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(&format!("SLOTFINDER_{name}"));
        let num = |name: &str| var(name).and_then(|s| s.trim().parse::<u64>().ok());

        let slot_minutes = num("SLOT_MINUTES").map_or(60, |m| m.min(u32::MAX as u64) as u32);
        if slot_minutes == 0 {
            return Err(ConfigError::ZeroSlotLength);
        }
        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("text") => LogFormat::Text,
            Some(other) => return Err(ConfigError::UnknownLogFormat(other.to_string())),
        };
        let read_timeout = match num("READ_TIMEOUT_MS").unwrap_or(5000) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(Self {
            bind: var("BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: var("PORT").and_then(|s| s.parse().ok()).unwrap_or(5433),
            http_addr: var("HTTP_ADDR").unwrap_or_else(|| "localhost:3000".into()),
            data_dir: PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "./data".into())),
            metrics_port: var("METRICS_PORT").and_then(|s| s.parse().ok()),
            max_connections: num("MAX_CONNECTIONS").map_or(256, |n| n as usize),
            compact_threshold: num("COMPACT_THRESHOLD").unwrap_or(1000),
            slot_minutes,
            read_timeout,
            log_format,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "debug".into()),
        })
    }

    pub fn slot_length(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.slot_minutes))
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotfinder.wal")
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the level.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("slotfinder={},warn", config.log_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

//! Configuration module - environment variable parsing

use std::env;
use std::str::FromStr;

use crate::util::time::DEFAULT_TICK_RATE;
use crate::ws::ReconnectPolicy;

/// Client configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Relay WebSocket endpoint
    pub relay_url: String,
    /// Room to join; absent means create one
    pub room_code: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Host loop ticks per second
    pub tick_rate: u32,
    pub reconnect: ReconnectPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ReconnectPolicy::default();

        Ok(Self {
            relay_url: lookup("RELAY_URL").unwrap_or_else(|| "ws://127.0.0.1:8080/ws".to_string()),
            room_code: lookup("ROOM_CODE")
                .map(|code| code.trim().to_string())
                .filter(|code| !code.is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?,
            tick_rate: parse_or(&lookup, "TICK_RATE", DEFAULT_TICK_RATE)?,
            reconnect: ReconnectPolicy {
                max_attempts: parse_or(&lookup, "RECONNECT_MAX_ATTEMPTS", 0)?,
                base_delay_ms: parse_or(&lookup, "RECONNECT_BASE_DELAY_MS", defaults.base_delay_ms)?,
                max_delay_ms: parse_or(&lookup, "RECONNECT_MAX_DELAY_MS", defaults.max_delay_ms)?,
            },
        })
    }
}

/// Log line encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

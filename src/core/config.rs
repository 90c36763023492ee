//! Producer and bus sink configuration
//!
//! Caller settings are a flat map of client options (credentials, endpoint,
//! tuning). They are merged over the producer defaults with the caller's
//! values winning on every key collision.

use super::error::{LoggerError, Result};
use super::log_level::LogLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const RETRIES_KEY: &str = "retries";
pub const ACKS_KEY: &str = "acks";
pub const COMPRESSION_KEY: &str = "compression";
pub const ENDPOINT_KEY: &str = "bootstrap.servers";

pub const DEFAULT_RETRIES: u32 = 1;
pub const DEFAULT_ACKS: i64 = 1;
pub const DEFAULT_COMPRESSION: &str = "lz4";

/// Caller-supplied client settings
pub type ClientSettings = BTreeMap<String, Value>;

/// Broker acknowledgment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acks {
    /// Fire and forget (`0`)
    None,
    /// Leader only (`1`)
    Leader,
    /// All in-sync replicas (`all` or `-1`)
    All,
}

/// Payload compression codec requested from the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

/// Merged producer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProducerConfig {
    settings: BTreeMap<String, Value>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        let mut settings = BTreeMap::new();
        settings.insert(RETRIES_KEY.to_string(), Value::from(DEFAULT_RETRIES));
        settings.insert(ACKS_KEY.to_string(), Value::from(DEFAULT_ACKS));
        settings.insert(COMPRESSION_KEY.to_string(), Value::from(DEFAULT_COMPRESSION));
        Self { settings }
    }
}

impl ProducerConfig {
    /// The producer defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `settings`; caller values take precedence
    pub fn merged(settings: &ClientSettings) -> Self {
        let mut config = Self::default();
        for (key, value) in settings {
            config.settings.insert(key.clone(), value.clone());
        }
        config
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// A setting rendered as text (strings unquoted)
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.settings.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.settings.iter()
    }

    /// Extra delivery attempts after the first one fails
    pub fn retries(&self) -> Result<u32> {
        let raw = self.get_str(RETRIES_KEY).unwrap_or_else(|| DEFAULT_RETRIES.to_string());
        raw.parse::<u32>()
            .map_err(|_| LoggerError::config("ProducerConfig", format!("invalid {}: '{}'", RETRIES_KEY, raw)))
    }

    pub fn acks(&self) -> Result<Acks> {
        let raw = self.get_str(ACKS_KEY).unwrap_or_else(|| DEFAULT_ACKS.to_string());
        match raw.to_lowercase().as_str() {
            "0" => Ok(Acks::None),
            "1" => Ok(Acks::Leader),
            "all" | "-1" => Ok(Acks::All),
            _ => Err(LoggerError::config(
                "ProducerConfig",
                format!("invalid {}: '{}'", ACKS_KEY, raw),
            )),
        }
    }

    pub fn compression(&self) -> Result<Compression> {
        let raw = self
            .get_str(COMPRESSION_KEY)
            .unwrap_or_else(|| DEFAULT_COMPRESSION.to_string());
        match raw.to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(LoggerError::config(
                "ProducerConfig",
                format!("unsupported {}: '{}'", COMPRESSION_KEY, raw),
            )),
        }
    }

    /// Transport endpoint, if one was configured
    pub fn endpoint(&self) -> Option<String> {
        self.get_str(ENDPOINT_KEY)
    }

    /// Check every tuning value the producer interprets
    pub fn validate(&self) -> Result<()> {
        self.retries()?;
        self.acks()?;
        self.compression()?;
        Ok(())
    }
}

/// Configuration of a message-bus sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSinkConfig {
    pub topic: String,
    #[serde(default = "default_level")]
    pub level: LogLevel,
    /// Credentials, endpoint and client tuning overrides
    #[serde(default)]
    pub producer: ClientSettings,
}

fn default_level() -> LogLevel {
    LogLevel::Debug
}

impl BusSinkConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            level: default_level(),
            producer: ClientSettings::new(),
        }
    }

    /// Load from a JSON document such as
    /// `{"topic": "logs", "level": "INFO", "producer": {"bootstrap.servers": "host:9092"}}`
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.topic.is_empty() {
            return Err(LoggerError::config("BusSinkConfig", "topic must not be empty"));
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.producer.insert(key.into(), value.into());
        self
    }
}

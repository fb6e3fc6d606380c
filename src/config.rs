//! Configuration management for the alert relay
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer compiled defaults, a `relay.toml` file, `RELAY_`-prefixed
//! environment variables and command-line arguments.

use crate::cli::Cli;
use crate::core::MAX_CONTENT_LEN;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Config file read when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// HTTP ingress settings.
    pub server: ServerConfig,
    /// Outbound sink settings and destination pool.
    pub sink: SinkConfig,
    /// Delivery queue and dispatcher settings.
    pub queue: QueueConfig,
    /// Duplicate suppression settings.
    pub deduplication: DeduplicationConfig,
    /// Operator-facing failure channel.
    pub admin: AdminConfig,
    /// Prometheus exposition.
    pub metrics: MetricsConfig,
}

/// HTTP ingress settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
}

/// How the ingress adapter renders relay requests.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Text,
    Embed,
}

/// Outbound sink settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SinkConfig {
    /// Default pool; rotated round-robin when it holds several endpoints.
    #[serde(default)]
    pub default_webhooks: Vec<String>,
    /// Named channels, addressable through the destination hint.
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
    /// Prefix an ad-hoc endpoint must carry to be used directly.
    pub endpoint_prefix: String,
    /// Ad-hoc endpoints must be strictly shorter than this.
    pub endpoint_max_len: usize,
    /// Maximum characters in a plain-text message.
    pub max_content_len: usize,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Wait when the sink rate-limits without a hint, in milliseconds.
    pub rate_limit_fallback_ms: u64,
    /// Wait when an edge proxy blocks without a hint, in milliseconds.
    pub edge_block_fallback_ms: u64,
    /// Ceiling on any wait the sink asks for, in milliseconds.
    pub max_retry_after_ms: u64,
    /// Message shape produced by the ingress formatter.
    #[serde(default)]
    pub format: MessageFormat,
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Delivery queue and dispatcher settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QueueConfig {
    /// Enqueue fails with `QueueFull` at this many pending items.
    pub max_size: usize,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Minimum gap between sends, in milliseconds.
    pub send_interval_ms: u64,
    /// Wait after a transient failure, in milliseconds.
    pub transient_backoff_ms: u64,
    /// Consecutive transient failures before the sink is reported unreachable.
    pub unreachable_threshold: u32,
    /// Maximum entries returned by the queue preview.
    pub preview_limit: usize,
}

impl QueueConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn transient_backoff(&self) -> Duration {
        Duration::from_millis(self.transient_backoff_ms)
    }
}

/// Duplicate suppression settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeduplicationConfig {
    /// Window in which a repeated signature for a subject is suppressed.
    pub cooldown_seconds: u64,
    /// Records idle for this many cooldown windows are evicted.
    pub retention_multiplier: u32,
    /// Optional hard cap on tracked subjects.
    #[serde(default)]
    pub max_entries: Option<u64>,
}

impl DeduplicationConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

/// Operator-facing failure channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct AdminConfig {
    /// When unset, admin notifications are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Prometheus exposition.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Precedence, lowest first: defaults, TOML file, `RELAY_` environment
    /// variables (nested keys split on `__`), command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::figment(path).merge(cli).extract_config()
    }

    /// Loads configuration from a file and the environment only.
    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::figment(path.into()).extract_config()
    }

    fn figment(path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RELAY_").split("__"))
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_size == 0 {
            bail!("queue.max_size must be greater than zero");
        }
        if self.deduplication.cooldown_seconds == 0 {
            bail!("deduplication.cooldown_seconds must be greater than zero");
        }
        if self.deduplication.retention_multiplier == 0 {
            bail!("deduplication.retention_multiplier must be greater than zero");
        }
        if self.sink.max_retry_after_ms == 0 {
            bail!("sink.max_retry_after_ms must be greater than zero");
        }
        if self.sink.max_content_len == 0 || self.sink.max_content_len > MAX_CONTENT_LEN {
            bail!(
                "sink.max_content_len must be between 1 and {}",
                MAX_CONTENT_LEN
            );
        }
        Ok(())
    }
}

trait ExtractConfig {
    fn extract_config(self) -> Result<Config>;
}

impl ExtractConfig for Figment {
    fn extract_config(self) -> Result<Config> {
        let config: Config = self.extract()?;
        config.validate()?;
        Ok(config)
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig {
                listen_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            },
            sink: SinkConfig {
                default_webhooks: Vec::new(),
                channels: BTreeMap::new(),
                endpoint_prefix: "https://discord.com/api/webhooks/".to_string(),
                endpoint_max_len: 300,
                max_content_len: MAX_CONTENT_LEN,
                timeout_ms: 10_000,
                rate_limit_fallback_ms: 5_000,
                edge_block_fallback_ms: 10_000,
                max_retry_after_ms: 600_000,
                format: MessageFormat::Text,
            },
            queue: QueueConfig {
                max_size: 1_000,
                max_retries: 5,
                send_interval_ms: 1_100,
                transient_backoff_ms: 2_000,
                unreachable_threshold: 3,
                preview_limit: 50,
            },
            deduplication: DeduplicationConfig {
                cooldown_seconds: 300,
                retention_multiplier: 12,
                max_entries: None,
            },
            admin: AdminConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged over
//! the configuration from `relay.toml` and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Relays alert events to a rate-limited webhook sink.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address the HTTP ingress listens on.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Duplicate suppression window in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub cooldown: Option<u64>,

    /// Maximum number of pending deliveries.
    #[arg(long, value_name = "COUNT")]
    pub max_queue_size: Option<usize>,

    /// Default webhook endpoint; may be repeated to build a round-robin pool.
    #[arg(long = "webhook", value_name = "URL")]
    pub webhooks: Vec<String>,

    /// Serve Prometheus metrics at /metrics.
    #[arg(long)]
    pub metrics: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(addr) = self.listen {
            dict.insert(
                "server".into(),
                nested("listen_address", Value::from(addr.to_string())),
            );
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(cooldown) = self.cooldown {
            dict.insert(
                "deduplication".into(),
                nested("cooldown_seconds", Value::from(cooldown)),
            );
        }

        if let Some(size) = self.max_queue_size {
            dict.insert("queue".into(), nested("max_size", Value::from(size)));
        }

        if !self.webhooks.is_empty() {
            dict.insert(
                "sink".into(),
                nested("default_webhooks", Value::from(self.webhooks.clone())),
            );
        }

        // A bare flag can only switch metrics on; leaving it off defers to config.
        if self.metrics {
            dict.insert("metrics".into(), nested("enabled", Value::from(true)));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

fn nested(key: &str, value: Value) -> Value {
    let mut dict = Dict::new();
    dict.insert(key.into(), value);
    Value::from(dict)
}

#![allow(dead_code)]
//! Shared fixtures for integration tests.

pub mod app;
pub mod mock_admin;
pub mod mock_sink;

use alert_relay::config::Config;

pub const DEFAULT_HOOK: &str = "https://discord.com/api/webhooks/100/default-token";
pub const OPS_HOOK: &str = "https://discord.com/api/webhooks/200/ops-token";

/// A config pointing at fake webhooks, bound to an ephemeral port.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.listen_address = "127.0.0.1:0".parse().unwrap();
    config.sink.default_webhooks = vec![DEFAULT_HOOK.to_string()];
    config
        .sink
        .channels
        .insert("ops".to_string(), OPS_HOOK.to_string());
    config.queue.unreachable_threshold = 0;
    config
}

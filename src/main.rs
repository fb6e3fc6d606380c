//! Alert relay
//!
//! Accepts alert events over HTTP and forwards each one, once per duplicate
//! window, to a rate-limited webhook sink.

use alert_relay::{app::App, cli::Cli, config::Config};
use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {:#}", err);
            return Err(err);
        }
    };

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Alert relay starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}", config.server.listen_address);
    info!("Default Webhooks: {}", config.sink.default_webhooks.len());
    info!("Named Channels: {}", config.sink.channels.len());
    info!("Message Format: {:?}", config.sink.format);
    info!("Sink Timeout: {}ms", config.sink.timeout_ms);
    info!("Queue Capacity: {}", config.queue.max_size);
    info!("Max Retries: {}", config.queue.max_retries);
    info!("Send Interval: {}ms", config.queue.send_interval_ms);
    info!("Dedup Cooldown: {}s", config.deduplication.cooldown_seconds);
    info!(
        "Admin Webhook: {}",
        if config.admin.webhook_url.is_some() {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    info!("Metrics: {}", if config.metrics.enabled { "Enabled" } else { "Disabled" });
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;
    let app_handle = tokio::spawn(app.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Shutting down gracefully...");
    shutdown_tx.send(true)?;

    app_handle.await??;
    info!("All tasks shut down. Exiting.");
    Ok(())
}

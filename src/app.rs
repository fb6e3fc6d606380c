//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::{AdminNotifier, SinkClient},
    deduplication::Deduplicator,
    dispatcher::{Dispatcher, DispatcherSettings},
    formatting::formatter_for,
    internal_metrics::MetricsBuilder,
    notification::{LoggingAdminNotifier, WebhookAdminNotifier, WebhookClient},
    queue::DeliveryQueue,
    relay::Relay,
    routing::DestinationRouter,
    server::{self, ServerState},
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    relay: Arc<Relay>,
    local_addr: Option<SocketAddr>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The producer-facing entry point, for in-process submission.
    pub fn relay(&self) -> Arc<Relay> {
        self.relay.clone()
    }

    /// The address the HTTP ingress is bound to, if it was started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        shutdown_rx.changed().await.ok();
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Separates constructing the pipeline from running it, and lets tests
/// replace the outbound clients.
pub struct AppBuilder {
    config: Config,
    sink_override: Option<Arc<dyn SinkClient>>,
    admin_override: Option<Arc<dyn AdminNotifier>>,
    serve_http: bool,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sink_override: None,
            admin_override: None,
            serve_http: true,
        }
    }

    /// Overrides the sink client for testing.
    pub fn sink_override(mut self, sink: Arc<dyn SinkClient>) -> Self {
        self.sink_override = Some(sink);
        self
    }

    /// Overrides the admin notifier for testing.
    pub fn admin_override(mut self, admin: Arc<dyn AdminNotifier>) -> Self {
        self.admin_override = Some(admin);
        self
    }

    /// Skips binding the HTTP ingress; events are submitted through [`App::relay`].
    pub fn without_http(mut self) -> Self {
        self.serve_http = false;
        self
    }

    /// Builds and starts all application components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let task_manager = TaskManager::new(shutdown_rx);

        // =========================================================================
        // 1. Metrics
        // =========================================================================
        let prometheus = MetricsBuilder::new(config.metrics.clone()).build();

        // =========================================================================
        // 2. Outbound clients
        // =========================================================================
        let sink: Arc<dyn SinkClient> = match self.sink_override {
            Some(sink) => sink,
            None => Arc::new(WebhookClient::from_config(&config.sink)?),
        };

        let admin: Arc<dyn AdminNotifier> = match (self.admin_override, &config.admin.webhook_url) {
            (Some(admin), _) => admin,
            (None, Some(url)) => Arc::new(WebhookAdminNotifier::new(
                url.clone(),
                config.sink.timeout(),
            )?),
            (None, None) => {
                warn!("No admin webhook configured; persistent failures will only be logged.");
                Arc::new(LoggingAdminNotifier)
            }
        };

        // =========================================================================
        // 3. Pipeline
        // =========================================================================
        let router = DestinationRouter::from_config(&config.sink);
        for destination in router.destinations() {
            debug!(%destination, "Configured destination");
        }
        if config.sink.default_webhooks.is_empty() {
            warn!("No default webhook configured; events without a channel hint will be rejected.");
        }
        debug!(
            cooldown_seconds = config.deduplication.cooldown_seconds,
            retention_multiplier = config.deduplication.retention_multiplier,
            "Initializing deduplicator"
        );
        let deduplicator = Deduplicator::from_config(&config.deduplication);
        let queue = Arc::new(DeliveryQueue::new(config.queue.max_size));
        let relay = Arc::new(Relay::new(
            deduplicator,
            router,
            queue.clone(),
            config.sink.max_content_len,
        ));

        let dispatcher = Dispatcher::new(
            queue,
            sink,
            admin,
            DispatcherSettings::from(&config.queue),
        );
        task_manager.spawn("Dispatcher", dispatcher.run(task_manager.get_shutdown_rx()));

        // =========================================================================
        // 4. HTTP ingress
        // =========================================================================
        let local_addr = if self.serve_http {
            let listener = TcpListener::bind(config.server.listen_address)
                .await
                .with_context(|| {
                    format!("Failed to bind HTTP server to {}", config.server.listen_address)
                })?;
            let addr = listener.local_addr()?;
            let state = Arc::new(ServerState {
                relay: relay.clone(),
                formatter: formatter_for(config.sink.format),
                preview_limit: config.queue.preview_limit,
                started_at: Instant::now(),
                prometheus,
            });
            task_manager.spawn(
                "HttpServer",
                server::serve(listener, server::router(state), task_manager.get_shutdown_rx()),
            );
            info!("HTTP ingress listening on {}", addr);
            Some(addr)
        } else {
            None
        };

        Ok(App {
            task_manager,
            relay,
            local_addr,
        })
    }
}

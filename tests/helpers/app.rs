//! Test helpers for running the full application instance.

use super::{mock_admin::RecordingAdmin, mock_sink::MockSinkClient};
use alert_relay::{app::App, config::Config, relay::Relay};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle, time::timeout};

/// A running application wired to a mock sink and admin notifier.
pub struct TestApp {
    pub relay: Arc<Relay>,
    pub sink: Arc<MockSinkClient>,
    pub admin: Arc<RecordingAdmin>,
    pub addr: Option<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    app_handle: JoinHandle<Result<()>>,
}

impl TestApp {
    pub async fn start(config: Config, sink: Arc<MockSinkClient>, with_http: bool) -> Result<Self> {
        let admin = RecordingAdmin::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut builder = App::builder(config)
            .sink_override(sink.clone())
            .admin_override(admin.clone());
        if !with_http {
            builder = builder.without_http();
        }
        let app = builder.build(shutdown_rx).await?;
        let relay = app.relay();
        let addr = app.local_addr();
        let app_handle = tokio::spawn(app.run());

        Ok(Self {
            relay,
            sink,
            admin,
            addr,
            shutdown_tx,
            app_handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        let addr = self.addr.expect("HTTP ingress was not started");
        format!("http://{}{}", addr, path)
    }

    /// Shuts down the application and waits for it to terminate.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send(true)?;
        match timeout(timeout_duration, self.app_handle).await {
            Ok(joined) => joined?,
            Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
        }
    }
}

//! Best-effort reporting of persistent delivery failures to an operator.
//!
//! Nothing in here returns an error: a failed admin notification is logged
//! and dropped so it can never disturb the delivery path.

use crate::core::{AdminNotifier, MAX_CONTENT_LEN};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

/// Posts admin messages straight to a dedicated webhook, bypassing the queue.
pub struct WebhookAdminNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookAdminNotifier {
    pub fn new(webhook_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }
}

#[async_trait]
impl AdminNotifier for WebhookAdminNotifier {
    async fn notify(&self, message: &str) {
        let content: String = message.chars().take(MAX_CONTENT_LEN).collect();
        let payload = json!({ "content": content });

        match self.client.post(&self.webhook_url).json(&payload).send().await {
            Ok(res) if res.status().is_success() => {
                metrics::counter!("admin_notifications_total", "status" => "sent").increment(1);
                info!("Admin notification sent");
            }
            Ok(res) => {
                metrics::counter!("admin_notifications_total", "status" => "failed").increment(1);
                warn!(status = %res.status(), "Admin webhook rejected notification");
            }
            Err(e) => {
                metrics::counter!("admin_notifications_total", "status" => "failed").increment(1);
                warn!(error = %e.without_url(), "Admin notification failed");
            }
        }
    }
}

/// Used when no admin webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAdminNotifier;

#[async_trait]
impl AdminNotifier for LoggingAdminNotifier {
    async fn notify(&self, message: &str) {
        metrics::counter!("admin_notifications_total", "status" => "logged").increment(1);
        error!(admin_message = %message, "Delivery failure requires operator attention");
    }
}

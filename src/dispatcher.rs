//! The single-flight delivery worker.
//!
//! The dispatcher alternates between two states. While `Idle` it waits for
//! the queue to become non-empty. While `Sending` it takes the head item,
//! makes one sink attempt and settles the outcome: delivered and rejected
//! items leave the system, recoverable failures go back to the head of the
//! queue with their attempt count raised. Every attempt is followed by a
//! timed wait (the inter-send interval or the backoff) that is raced
//! against shutdown. Admin notifications run on their own task so a slow
//! admin channel never delays the next attempt.

use crate::config::QueueConfig;
use crate::core::{AdminNotifier, DeliveryOutcome, QueueItem, SinkClient};
use crate::queue::{DeliveryQueue, PREVIEW_CHARS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Retry and pacing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Minimum gap between two attempts.
    pub send_interval: Duration,
    /// Wait after a transient failure.
    pub transient_backoff: Duration,
    /// Consecutive transient failures before the sink is reported
    /// unreachable. Zero disables the report.
    pub unreachable_threshold: u32,
}

impl From<&QueueConfig> for DispatcherSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            send_interval: config.send_interval(),
            transient_backoff: config.transient_backoff(),
            unreachable_threshold: config.unreachable_threshold,
        }
    }
}

/// The only consumer of the [`DeliveryQueue`].
pub struct Dispatcher {
    queue: Arc<DeliveryQueue>,
    sink: Arc<dyn SinkClient>,
    admin: Arc<dyn AdminNotifier>,
    settings: DispatcherSettings,
    consecutive_transient: u32,
    degraded: bool,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        sink: Arc<dyn SinkClient>,
        admin: Arc<dyn AdminNotifier>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            queue,
            sink,
            admin,
            settings,
            consecutive_transient: 0,
            degraded: false,
        }
    }

    /// Runs the dispatcher's main loop until shutdown.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Dispatcher started.");
        loop {
            let Some(item) = self.next_item(&mut shutdown_rx).await else {
                break;
            };

            let outcome = self.sink.attempt(&item.content, &item.destination).await;
            metrics::counter!("delivery_attempts_total", "outcome" => outcome.as_str())
                .increment(1);

            let wait = self.settle(item, outcome);
            if !wait_for(wait, &mut shutdown_rx).await {
                info!("Dispatcher received shutdown signal during wait.");
                break;
            }
        }

        let abandoned = self.queue.len();
        if abandoned > 0 {
            warn!(abandoned, "Dispatcher stopped with deliveries still queued.");
        }
        info!("Dispatcher finished.");
    }

    /// Blocks in `Idle` until an item is available. `None` means shutdown.
    async fn next_item(&self, shutdown_rx: &mut watch::Receiver<bool>) -> Option<QueueItem> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Some(item);
            }
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Dispatcher received shutdown signal while idle.");
                    return None;
                }
                _ = self.queue.wait_ready() => {}
            }
        }
    }

    /// Applies an outcome and returns how long to wait before the next attempt.
    #[instrument(skip_all, fields(destination = %item.destination, attempt = item.attempt, outcome = outcome.as_str()))]
    fn settle(&mut self, item: QueueItem, outcome: DeliveryOutcome) -> Duration {
        match outcome {
            DeliveryOutcome::Delivered => {
                metrics::histogram!("delivery_latency_seconds")
                    .record(item.enqueued_at.elapsed().as_secs_f64());
                self.consecutive_transient = 0;
                if self.degraded {
                    info!("Sink reachable again.");
                    self.degraded = false;
                }
                debug!("Delivery complete.");
                self.settings.send_interval
            }
            DeliveryOutcome::PermanentRejection => {
                error!("Sink permanently rejected message; dropping.");
                self.notify_admin(format!(
                    "Message to {} was permanently rejected and dropped. Preview: {}",
                    item.destination,
                    item.content.preview(PREVIEW_CHARS)
                ));
                self.settings.send_interval
            }
            DeliveryOutcome::RateLimited { retry_after } => {
                self.retry_or_drop(item, retry_after)
            }
            DeliveryOutcome::TransientFailure => {
                self.consecutive_transient += 1;
                let threshold = self.settings.unreachable_threshold;
                if threshold > 0 && self.consecutive_transient >= threshold && !self.degraded {
                    self.degraded = true;
                    warn!(
                        failures = self.consecutive_transient,
                        "Sink looks unreachable."
                    );
                    self.notify_admin(format!(
                        "Sink looks unreachable: {} consecutive delivery failures.",
                        self.consecutive_transient
                    ));
                }
                self.retry_or_drop(item, self.settings.transient_backoff)
            }
        }
    }

    /// Re-inserts the item at the head or gives up once retries are spent.
    ///
    /// The wait applies either way: the sink is just as limited for the next
    /// item as it was for this one.
    fn retry_or_drop(&self, mut item: QueueItem, backoff: Duration) -> Duration {
        let wait = backoff.max(self.settings.send_interval);

        if item.attempt < self.settings.max_retries {
            item.attempt += 1;
            metrics::counter!("retries_scheduled_total").increment(1);
            warn!(
                next_attempt = item.attempt,
                wait_ms = wait.as_millis() as u64,
                "Delivery failed; retrying at head of queue."
            );
            self.queue.push_front(item);
        } else {
            metrics::counter!("retries_exhausted_total").increment(1);
            error!(
                attempts = item.attempt + 1,
                "Delivery retries exhausted; dropping."
            );
            self.notify_admin(format!(
                "Giving up on message to {} after {} attempts. Preview: {}",
                item.destination,
                item.attempt + 1,
                item.content.preview(PREVIEW_CHARS)
            ));
        }
        wait
    }

    fn notify_admin(&self, message: String) {
        let admin = self.admin.clone();
        tokio::spawn(async move {
            admin.notify(&message).await;
        });
    }
}

/// Sleeps for `wait`. Returns `false` if shutdown arrived first.
///
/// `sleep` saturates a deadline past the clock's range instead of panicking.
async fn wait_for(wait: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown_rx.changed() => false,
        _ = sleep(wait) => true,
    }
}

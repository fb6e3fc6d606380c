//! A scripted sink client that records every attempt.

use alert_relay::core::{DeliveryOutcome, Destination, Payload, SinkClient};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// One recorded sink call.
#[derive(Debug, Clone)]
pub struct SinkCall {
    pub content: Payload,
    pub destination: Destination,
    pub at: Instant,
}

/// Replays scripted outcomes in order, then reports `Delivered`.
#[derive(Debug, Default)]
pub struct MockSinkClient {
    script: Mutex<VecDeque<DeliveryOutcome>>,
    calls: Mutex<Vec<SinkCall>>,
    notifier: Notify,
}

impl MockSinkClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: Vec<DeliveryOutcome>) -> Arc<Self> {
        let sink = Self::default();
        *sink.script.lock().unwrap() = script.into();
        Arc::new(sink)
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Waits until at least `count` attempts were recorded.
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) {
        let wait = async {
            loop {
                let notified = self.notifier.notified();
                if self.call_count() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .expect("Timed out waiting for sink calls");
    }
}

#[async_trait]
impl SinkClient for MockSinkClient {
    async fn attempt(&self, content: &Payload, destination: &Destination) -> DeliveryOutcome {
        self.calls.lock().unwrap().push(SinkCall {
            content: content.clone(),
            destination: destination.clone(),
            at: Instant::now(),
        });
        self.notifier.notify_waiters();
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}

//! The bounded delivery queue shared between producers and the dispatcher.
//!
//! Producers only append. The dispatcher is the only caller of
//! [`DeliveryQueue::pop_front`] and [`DeliveryQueue::push_front`]. The lock is
//! never held across an await point.

use crate::core::{Destination, Payload, QueueItem};
use crate::error::QueueFull;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error};

/// Characters of content shown per pending item in diagnostics.
pub const PREVIEW_CHARS: usize = 100;

/// One row of the diagnostic queue preview.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueuePreview {
    pub index: usize,
    pub preview: String,
    pub destination: String,
    pub attempt: u32,
}

/// FIFO of pending deliveries with a fixed capacity.
#[derive(Debug)]
pub struct DeliveryQueue {
    items: Mutex<VecDeque<QueueItem>>,
    capacity: usize,
    ready: Notify,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            ready: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueueItem>> {
        // Every critical section is a single VecDeque call, so a poisoned
        // guard still holds a consistent queue.
        self.items.lock().unwrap_or_else(|poisoned| {
            error!("Delivery queue lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Appends a new delivery. Never blocks and never performs I/O.
    pub fn enqueue(&self, content: Payload, destination: Destination) -> Result<(), QueueFull> {
        let len = {
            let mut items = self.lock();
            if items.len() >= self.capacity {
                metrics::counter!("queue_full_total").increment(1);
                return Err(QueueFull {
                    capacity: self.capacity,
                });
            }
            items.push_back(QueueItem::new(content, destination));
            items.len()
        };
        metrics::counter!("items_enqueued_total").increment(1);
        metrics::gauge!("queue_length").set(len as f64);
        debug!(queue_length = len, "Enqueued delivery");
        self.ready.notify_one();
        Ok(())
    }

    /// Takes the head item.
    pub fn pop_front(&self) -> Option<QueueItem> {
        let (item, len) = {
            let mut items = self.lock();
            (items.pop_front(), items.len())
        };
        metrics::gauge!("queue_length").set(len as f64);
        item
    }

    /// Puts a retried item back at the head, ahead of everything that
    /// arrived after it failed.
    ///
    /// Bypasses the capacity check: the item already held a slot.
    pub fn push_front(&self, item: QueueItem) {
        let len = {
            let mut items = self.lock();
            items.push_front(item);
            items.len()
        };
        metrics::gauge!("queue_length").set(len as f64);
        self.ready.notify_one();
    }

    /// Waits until an enqueue has happened since the last wake-up.
    pub async fn wait_ready(&self) {
        self.ready.notified().await;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A bounded, log-safe view of pending items.
    pub fn preview(&self, limit: usize) -> Vec<QueuePreview> {
        self.lock()
            .iter()
            .take(limit)
            .enumerate()
            .map(|(index, item)| QueuePreview {
                index,
                preview: item.content.preview(PREVIEW_CHARS),
                destination: item.destination.to_string(),
                attempt: item.attempt,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest() -> Destination {
        Destination::endpoint("https://discord.com/api/webhooks/1/token")
    }

    fn text(s: &str) -> Payload {
        Payload::Text(s.to_string())
    }

    #[test]
    fn test_enqueue_is_fifo() {
        let queue = DeliveryQueue::new(10);
        queue.enqueue(text("a"), dest()).unwrap();
        queue.enqueue(text("b"), dest()).unwrap();
        assert_eq!(queue.pop_front().unwrap().content, text("a"));
        assert_eq!(queue.pop_front().unwrap().content, text("b"));
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_full_queue_rejects_without_changing_length() {
        let queue = DeliveryQueue::new(2);
        queue.enqueue(text("a"), dest()).unwrap();
        queue.enqueue(text("b"), dest()).unwrap();
        assert_eq!(
            queue.enqueue(text("c"), dest()),
            Err(QueueFull { capacity: 2 })
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_push_front_jumps_ahead() {
        let queue = DeliveryQueue::new(10);
        queue.enqueue(text("a"), dest()).unwrap();
        queue.enqueue(text("b"), dest()).unwrap();
        let mut a = queue.pop_front().unwrap();
        queue.enqueue(text("c"), dest()).unwrap();
        a.attempt += 1;
        queue.push_front(a);

        let order: Vec<Payload> = std::iter::from_fn(|| queue.pop_front())
            .map(|item| item.content)
            .collect();
        assert_eq!(order, vec![text("a"), text("b"), text("c")]);
    }

    #[test]
    fn test_preview_is_bounded_and_redacted() {
        let queue = DeliveryQueue::new(10);
        queue.enqueue(text(&"x".repeat(500)), dest()).unwrap();
        queue.enqueue(text("second"), dest()).unwrap();

        let preview = queue.preview(1);
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].preview.chars().count(), PREVIEW_CHARS);
        assert_eq!(
            preview[0].destination,
            "https://discord.com/api/webhooks/1/***"
        );
        assert_eq!(preview[0].attempt, 0);
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let queue = std::sync::Arc::new(DeliveryQueue::new(10));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_ready().await })
        };
        queue.enqueue(text("a"), dest()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}

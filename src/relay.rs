//! The producer-facing entry point of the delivery pipeline.

use crate::core::Event;
use crate::deduplication::Deduplicator;
use crate::error::RelayError;
use crate::queue::{DeliveryQueue, QueuePreview};
use crate::routing::DestinationRouter;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// What happened to an accepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The event is queued for delivery.
    Enqueued,
    /// The event repeats a recent one and was dropped.
    Suppressed,
    /// The event opened a duplicate window but was not forwarded.
    Recorded,
}

/// Validates, deduplicates, routes and enqueues inbound events.
///
/// Every error is synchronous; once `Enqueued` is returned, delivery
/// failures are the dispatcher's concern.
pub struct Relay {
    deduplicator: Deduplicator,
    router: DestinationRouter,
    queue: Arc<DeliveryQueue>,
    max_content_len: usize,
}

impl Relay {
    pub fn new(
        deduplicator: Deduplicator,
        router: DestinationRouter,
        queue: Arc<DeliveryQueue>,
        max_content_len: usize,
    ) -> Self {
        Self {
            deduplicator,
            router,
            queue,
            max_content_len,
        }
    }

    #[instrument(skip_all, fields(subject = %event.subject_key))]
    pub async fn submit(&self, event: Event) -> Result<SubmitOutcome, RelayError> {
        if !self.admit(&event).await? {
            return Ok(SubmitOutcome::Suppressed);
        }

        let destination = match self.router.resolve(event.destination_hint.as_deref()) {
            Ok(destination) => destination,
            Err(e) => {
                self.deduplicator.release(&event.subject_key).await;
                warn!(error = %e, "Could not route alert.");
                return Err(e.into());
            }
        };

        debug!(destination = %destination, "Routing alert.");
        if let Err(full) = self.queue.enqueue(event.payload, destination) {
            self.deduplicator.release(&event.subject_key).await;
            warn!(error = %full, "Rejected alert: delivery queue is full.");
            return Err(full.into());
        }

        info!("Queued alert.");
        Ok(SubmitOutcome::Enqueued)
    }

    /// Validates and deduplicates an event without delivering it.
    ///
    /// A fresh event still opens a duplicate window for its subject, so a
    /// forwarded repeat inside the cooldown is suppressed.
    #[instrument(skip_all, fields(subject = %event.subject_key))]
    pub async fn submit_unforwarded(&self, event: Event) -> Result<SubmitOutcome, RelayError> {
        if !self.admit(&event).await? {
            return Ok(SubmitOutcome::Suppressed);
        }
        info!("Recorded alert without forwarding.");
        Ok(SubmitOutcome::Recorded)
    }

    /// Returns `false` when the event is a duplicate.
    async fn admit(&self, event: &Event) -> Result<bool, RelayError> {
        metrics::counter!("events_received_total").increment(1);

        event.validate()?;
        event.payload.check_limits(self.max_content_len)?;

        if self
            .deduplicator
            .should_suppress(&event.subject_key, &event.signature, Instant::now())
            .await
        {
            info!("Skipped duplicate alert.");
            return Ok(false);
        }
        Ok(true)
    }

    pub fn queue_length(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_preview(&self, limit: usize) -> Vec<QueuePreview> {
        self.queue.preview(limit)
    }
}

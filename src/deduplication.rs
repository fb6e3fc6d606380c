// Service for suppressing repeated alerts about the same subject.

use crate::config::DeduplicationConfig;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::time::Duration;
use tokio::time::Instant;

/// Per-subject memory of the last accepted signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupRecord {
    pub last_signature: String,
    pub last_seen_at: Instant,
}

/// Decides whether an event repeats a recently accepted one for the same subject.
///
/// Only an exact signature repeat inside the cooldown window is suppressed.
/// Records are retained for several cooldown windows and then evicted by the
/// cache's time-to-live, which never changes a suppression decision since an
/// evicted record would already be outside its window.
pub struct Deduplicator {
    cache: Cache<String, DedupRecord>,
    cooldown: Duration,
}

impl Deduplicator {
    /// Creates a new `Deduplicator`.
    ///
    /// # Arguments
    /// * `cooldown` - Window in which a repeated signature is suppressed.
    /// * `retention` - How long an idle record is kept; must exceed `cooldown`.
    /// * `max_entries` - Optional cap on tracked subjects.
    pub fn new(cooldown: Duration, retention: Duration, max_entries: Option<u64>) -> Self {
        let mut builder = Cache::builder().time_to_live(retention.max(cooldown));
        if let Some(max) = max_entries {
            builder = builder.max_capacity(max);
        }
        Self {
            cache: builder.build(),
            cooldown,
        }
    }

    pub fn from_config(config: &DeduplicationConfig) -> Self {
        let cooldown = config.cooldown();
        Self::new(
            cooldown,
            cooldown * config.retention_multiplier,
            config.max_entries,
        )
    }

    /// Returns `true` if the event should be dropped.
    ///
    /// When the event is not suppressed, `{signature, now}` becomes the
    /// subject's record. The check and the write are atomic per subject.
    pub async fn should_suppress(&self, subject_key: &str, signature: &str, now: Instant) -> bool {
        let cooldown = self.cooldown;
        let result = self
            .cache
            .entry(subject_key.to_string())
            .and_compute_with(|existing| {
                let suppress = existing.is_some_and(|entry| {
                    let record = entry.value();
                    record.last_signature == signature
                        && now.saturating_duration_since(record.last_seen_at) < cooldown
                });
                let op = if suppress {
                    Op::Nop
                } else {
                    Op::Put(DedupRecord {
                        last_signature: signature.to_string(),
                        last_seen_at: now,
                    })
                };
                std::future::ready(op)
            })
            .await;

        let suppressed = matches!(result, CompResult::Unchanged(_));
        if suppressed {
            metrics::counter!("duplicates_suppressed_total").increment(1);
        }
        metrics::gauge!("deduplication_records").set(self.cache.entry_count() as f64);
        suppressed
    }

    /// Forgets the subject's record.
    ///
    /// Used when an accepted event could not be queued, so the producer's
    /// retry is not mistaken for a duplicate.
    pub async fn release(&self, subject_key: &str) {
        self.cache.invalidate(subject_key).await;
    }

    /// Returns the current record for a subject, if any.
    #[cfg(test)]
    pub(crate) async fn record(&self, subject_key: &str) -> Option<DedupRecord> {
        self.cache.get(subject_key).await
    }
}

//! Core domain types and service traits for the alert relay
//!
//! This module defines the data that flows through the delivery pipeline and
//! the trait contracts at its two outbound seams: the sink client and the
//! admin notifier.

use crate::error::ValidationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum characters in a plain-text message accepted by the sink.
pub const MAX_CONTENT_LEN: usize = 2000;
/// Maximum characters in an embed title.
pub const MAX_EMBED_TITLE_LEN: usize = 256;
/// Maximum characters in an embed description.
pub const MAX_EMBED_DESCRIPTION_LEN: usize = 4096;
/// Maximum number of fields in an embed.
pub const MAX_EMBED_FIELDS: usize = 25;
/// Maximum characters across all text in an embed.
pub const MAX_EMBED_TOTAL_LEN: usize = 6000;

/// One inbound alert, as handed over by the ingress adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Identity of the thing the alert is about.
    pub subject_key: String,
    /// Why the alert fired; the duplicate-detection key.
    pub signature: String,
    /// Content to deliver.
    pub payload: Payload,
    /// Optional channel name or raw endpoint.
    pub destination_hint: Option<String>,
    /// Producer-supplied timestamp.
    pub received_at: String,
}

impl Event {
    /// Rejects events with missing required fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subject_key.trim().is_empty() {
            return Err(ValidationError::MissingField("subject_key"));
        }
        if self.signature.trim().is_empty() {
            return Err(ValidationError::MissingField("signature"));
        }
        if self.received_at.trim().is_empty() {
            return Err(ValidationError::MissingField("received_at"));
        }
        if self.payload.is_empty() {
            return Err(ValidationError::MissingField("payload"));
        }
        Ok(())
    }
}

/// A structured message body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<EmbedField>,
    /// ISO 8601 timestamp shown in the embed footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
}

/// A single name/value row inside an [`Embed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl Embed {
    fn text_len(&self) -> usize {
        let title = self.title.as_deref().map_or(0, char_count);
        let description = self.description.as_deref().map_or(0, char_count);
        let fields: usize = self
            .fields
            .iter()
            .map(|f| char_count(&f.name) + char_count(&f.value))
            .sum();
        title + description + fields
    }
}

/// The wire-ready content of one message. Exactly one shape per message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Embed(Embed),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(text) => text.trim().is_empty(),
            Payload::Embed(embed) => embed.text_len() == 0,
        }
    }

    /// Checks the payload against the sink's hard limits.
    ///
    /// Anything failing here would be rejected unconditionally by the sink.
    pub fn check_limits(&self, max_content_len: usize) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        match self {
            Payload::Text(text) => {
                let len = char_count(text);
                if len > max_content_len {
                    return Err(ValidationError::ContentTooLong {
                        len,
                        max: max_content_len,
                    });
                }
            }
            Payload::Embed(embed) => {
                if embed.title.as_deref().map_or(0, char_count) > MAX_EMBED_TITLE_LEN {
                    return Err(ValidationError::EmbedTooLarge("title"));
                }
                if embed.description.as_deref().map_or(0, char_count) > MAX_EMBED_DESCRIPTION_LEN
                {
                    return Err(ValidationError::EmbedTooLarge("description"));
                }
                if embed.fields.len() > MAX_EMBED_FIELDS {
                    return Err(ValidationError::EmbedTooLarge("fields"));
                }
                if embed.text_len() > MAX_EMBED_TOTAL_LEN {
                    return Err(ValidationError::EmbedTooLarge("total length"));
                }
            }
        }
        Ok(())
    }

    /// A short, log-safe excerpt of the payload.
    pub fn preview(&self, max_chars: usize) -> String {
        let source = match self {
            Payload::Text(text) => text.as_str(),
            Payload::Embed(embed) => embed
                .title
                .as_deref()
                .or(embed.description.as_deref())
                .unwrap_or("[embed]"),
        };
        source.chars().take(max_chars).collect()
    }
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}

/// A sink endpoint. Owned by the router; deliveries carry a clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Configured channel name, if the endpoint came from the channel map.
    pub name: Option<String>,
    pub url: String,
}

impl Destination {
    pub fn endpoint(url: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
        }
    }

    pub fn channel(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            url: url.into(),
        }
    }
}

/// Prints the channel name, or the URL with its trailing token elided.
impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            return write!(f, "#{}", name);
        }
        match self.url.trim_end_matches('/').rsplit_once('/') {
            Some((head, _token)) if head.contains("://") && !head.ends_with('/') => {
                write!(f, "{}/***", head)
            }
            _ => f.write_str("***"),
        }
    }
}

/// One delivery pending in, or taken from, the delivery queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub content: Payload,
    pub destination: Destination,
    /// Attempts already made. Never decreases across re-enqueues.
    pub attempt: u32,
    pub enqueued_at: Instant,
}

impl QueueItem {
    pub fn new(content: Payload, destination: Destination) -> Self {
        Self {
            content,
            destination,
            attempt: 0,
            enqueued_at: Instant::now(),
        }
    }
}

/// Result of a single sink attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    RateLimited { retry_after: Duration },
    TransientFailure,
    PermanentRejection,
}

impl DeliveryOutcome {
    /// Label used for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::RateLimited { .. } => "rate_limited",
            DeliveryOutcome::TransientFailure => "transient_failure",
            DeliveryOutcome::PermanentRejection => "permanent_rejection",
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Performs one delivery attempt against one destination.
#[async_trait]
pub trait SinkClient: Send + Sync {
    /// Sends `content` to `destination` exactly once and classifies the result.
    ///
    /// Implementations never retry; retry policy belongs to the dispatcher.
    async fn attempt(&self, content: &Payload, destination: &Destination) -> DeliveryOutcome;
}

/// Best-effort side channel for operator-facing failure reports.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    /// Reports `message`. Failures are logged and swallowed.
    async fn notify(&self, message: &str);
}

//! Error types surfaced synchronously to the producer.
//!
//! Delivery-time failures never appear here; the dispatcher absorbs them and
//! reports terminal ones through the admin notifier.

use thiserror::Error;

/// A malformed inbound event or an unsendable message body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("message content is empty")]
    EmptyContent,

    #[error("message content is {len} characters, limit is {max}")]
    ContentTooLong { len: usize, max: usize },

    #[error("embed exceeds sink limits: {0}")]
    EmbedTooLarge(&'static str),
}

/// The router could not map a hint onto a destination.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("unknown destination channel '{0}'")]
    UnknownDestination(String),

    #[error("no default destination is configured")]
    NoDefaultDestination,
}

/// The delivery queue is at capacity; the item never entered the system.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("delivery queue is full (capacity {capacity})")]
pub struct QueueFull {
    pub capacity: usize,
}

/// Errors returned by [`crate::relay::Relay::submit`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    QueueFull(#[from] QueueFull),
}

//! Alert relay - reliable, deduplicated delivery of alert events
//!
//! Events pass through a deduplicator and a destination router onto a
//! bounded queue. A single dispatcher drains the queue one attempt at a time,
//! honouring the sink's rate limits and retrying recoverable failures.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod deduplication;
pub mod dispatcher;
pub mod error;
pub mod formatting;
pub mod internal_metrics;
pub mod notification;
pub mod queue;
pub mod relay;
pub mod routing;
pub mod server;
pub mod task_manager;

// Re-export core types for convenience
pub use crate::core::*;
pub use crate::error::{QueueFull, RelayError, RouteError, ValidationError};

//! Outbound clients: the webhook sink and the admin side channel.
//!
//! Both implement the traits in [`crate::core`] so the dispatcher can be
//! driven by fakes in tests.
pub mod admin;
pub mod webhook;

pub use admin::{LoggingAdminNotifier, WebhookAdminNotifier};
pub use webhook::{RateLimitFallbacks, WebhookClient};

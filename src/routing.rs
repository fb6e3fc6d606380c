//! Resolves which sink endpoint an event is delivered to.

use crate::config::SinkConfig;
use crate::core::Destination;
use crate::error::RouteError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Owns the configured destination pool and the round-robin cursor.
#[derive(Debug)]
pub struct DestinationRouter {
    channels: BTreeMap<String, Destination>,
    defaults: Vec<Destination>,
    next_default: AtomicUsize,
    endpoint_prefix: String,
    endpoint_max_len: usize,
}

impl DestinationRouter {
    pub fn new(
        channels: BTreeMap<String, String>,
        defaults: Vec<String>,
        endpoint_prefix: impl Into<String>,
        endpoint_max_len: usize,
    ) -> Self {
        Self {
            channels: channels
                .into_iter()
                .map(|(name, url)| (name.clone(), Destination::channel(name, url)))
                .collect(),
            defaults: defaults.into_iter().map(Destination::endpoint).collect(),
            next_default: AtomicUsize::new(0),
            endpoint_prefix: endpoint_prefix.into(),
            endpoint_max_len,
        }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(
            config.channels.clone(),
            config.default_webhooks.clone(),
            config.endpoint_prefix.clone(),
            config.endpoint_max_len,
        )
    }

    /// Cheap shape check; makes no network request.
    pub fn is_valid_endpoint(&self, candidate: &str) -> bool {
        candidate.starts_with(&self.endpoint_prefix)
            && candidate.len() > self.endpoint_prefix.len()
            && candidate.len() < self.endpoint_max_len
    }

    /// Maps an optional hint onto a destination.
    ///
    /// A valid endpoint is used as-is, a bare name must be a configured
    /// channel, and anything else (absent, blank, or a URL that fails the
    /// shape check) falls back to the default pool.
    pub fn resolve(&self, hint: Option<&str>) -> Result<Destination, RouteError> {
        let hint = hint.map(str::trim).filter(|h| !h.is_empty());

        if let Some(hint) = hint {
            if self.is_valid_endpoint(hint) {
                debug!("Routing to ad-hoc endpoint");
                return Ok(Destination::endpoint(hint));
            }
            if let Some(dest) = self.channels.get(hint) {
                return Ok(dest.clone());
            }
            if !looks_like_url(hint) {
                return Err(RouteError::UnknownDestination(hint.to_string()));
            }
            debug!("Endpoint hint failed validation, using default pool");
        }

        self.next_default()
    }

    fn next_default(&self) -> Result<Destination, RouteError> {
        if self.defaults.is_empty() {
            return Err(RouteError::NoDefaultDestination);
        }
        let index = self.next_default.fetch_add(1, Ordering::Relaxed) % self.defaults.len();
        Ok(self.defaults[index].clone())
    }

    /// Returns every configured endpoint, channels first.
    pub fn destinations(&self) -> impl Iterator<Item = &Destination> {
        self.channels.values().chain(self.defaults.iter())
    }
}

fn looks_like_url(hint: &str) -> bool {
    hint.contains("://")
}

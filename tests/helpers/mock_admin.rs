//! An admin notifier that records messages instead of sending them.

use alert_relay::core::AdminNotifier;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct RecordingAdmin {
    messages: Mutex<Vec<String>>,
}

impl RecordingAdmin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdminNotifier for RecordingAdmin {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

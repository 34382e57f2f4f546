use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use crate::bus::EventBus;

/// In-process event bus: per-topic subscriber lists over unbounded channels.
/// Publishing clones the payload to every live subscriber and prunes closed
/// ones. Queues are unbounded; there is no backpressure.
pub struct MemoryBus {
    topics: Mutex<HashMap<String, Vec<UnboundedSender<Value>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self { topics: Mutex::new(HashMap::new()) }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), String> {
        let mut topics = self.topics.lock().await;
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = self.topics.lock().await;
        topics.entry(topic.to_string()).or_default().push(tx);
        rx
    }
}

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

pub mod memory;

pub use memory::MemoryBus;

/// Topics used by the settlement lifecycle.
pub mod topics {
    pub const SETTLEMENT_REQUESTS: &str = "settlement_requests";
    pub const SETTLEMENT_CONFIRMED: &str = "settlement_confirmed";
    pub const SETTLEMENT_FAILED: &str = "settlement_failed";
}

/// Topic-based publish/subscribe with JSON payloads. Delivery is
/// at-least-once within the process; ordering is preserved per publisher.
/// Subscribers receive decoded payloads over a channel consumed by a worker
/// task; a failing handler must not tear down the subscription.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), String>;

    async fn subscribe(&self, topic: &str) -> UnboundedReceiver<Value>;
}

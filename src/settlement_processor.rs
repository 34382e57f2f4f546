use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rand::Rng;
use serde_json::json;
use tokio::time::sleep;
use uuid::Uuid;

use crate::bus::{topics, EventBus};
use crate::models::SettlementRequested;
use crate::store::{SettlementOutcome, Store};

const PROCESSING_ERROR_REASON: &str = "Processing error occurred";

/// Consumes `settlement_requests`, applies a simulated confirmation delay,
/// drives each settlement through its single store transition and publishes
/// the outcome. Failures are contained per event; the worker never dies on a
/// bad message.
pub struct SettlementProcessor {
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
    delay_ms: (u64, u64),
}

impl SettlementProcessor {
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn EventBus>, delay_ms: (u64, u64)) -> Self {
        Self { store, bus, delay_ms }
    }

    /// Subscribe and spawn the consumer loop. Subscription happens before
    /// this returns, so no request published afterwards can be missed.
    pub async fn start(self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.bus.subscribe(topics::SETTLEMENT_REQUESTS).await;
        info!("settlement processor subscribed to {}", topics::SETTLEMENT_REQUESTS);

        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let event: SettlementRequested = match serde_json::from_value(payload) {
                    Ok(event) => event,
                    Err(err) => {
                        warn!("settlement processor: undecodable payload: {}", err);
                        continue;
                    }
                };
                self.handle(event).await;
            }
            info!("settlement processor stopped");
        })
    }

    async fn handle(&self, event: SettlementRequested) {
        let (min, max) = self.delay_ms;
        let delay = if min >= max {
            min
        } else {
            rand::thread_rng().gen_range(min..=max)
        };
        sleep(Duration::from_millis(delay)).await;

        match self.store.apply_settlement(event.id).await {
            Ok(SettlementOutcome::Confirmed(record)) => {
                info!(
                    "settlement {} confirmed: {} {} from {} to {}",
                    record.id, record.amount, record.asset, record.from, record.to
                );
                self.publish(topics::SETTLEMENT_CONFIRMED, json!({ "id": record.id })).await;
            }
            Ok(SettlementOutcome::InsufficientBalance { reason }) => {
                warn!("settlement {} failed: {}", event.id, reason);
                self.publish(
                    topics::SETTLEMENT_FAILED,
                    json!({ "id": event.id, "reason": reason }),
                )
                .await;
            }
            Ok(SettlementOutcome::AlreadyTerminal) => {
                debug!("settlement {} already terminal, skipping redelivery", event.id);
            }
            Ok(SettlementOutcome::NotFound) => {
                warn!("settlement {} not found, dropping event", event.id);
            }
            Err(err) => {
                error!("settlement {} processing error: {}", event.id, err);
                self.mark_failed(event.id).await;
            }
        }
    }

    async fn mark_failed(&self, id: Uuid) {
        if let Err(err) = self.store.fail_settlement(id, PROCESSING_ERROR_REASON).await {
            error!("settlement {}: could not record failure: {}", id, err);
        }
        self.publish(
            topics::SETTLEMENT_FAILED,
            json!({ "id": id, "reason": PROCESSING_ERROR_REASON }),
        )
        .await;
    }

    async fn publish(&self, topic: &str, payload: serde_json::Value) {
        if let Err(err) = self.bus.publish(topic, payload).await {
            error!("settlement processor: publish to {} failed: {}", topic, err);
        }
    }
}

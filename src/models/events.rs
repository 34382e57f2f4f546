use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload published to `settlement_requests` when a settlement is accepted.
/// `amount` is raw at the asset's scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequested {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub asset: String,
}

/// Payload published to `settlement_confirmed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfirmed {
    pub id: Uuid,
}

/// Payload published to `settlement_failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementFailed {
    pub id: Uuid,
    pub reason: String,
}

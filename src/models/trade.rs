use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of one match between a buy and a sell order. Immutable after
/// creation. `amount` is raw at the base asset's scale, `price` raw at the
/// quote scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub asset: String,
    pub amount: u64,
    pub price: u64,
    pub buyer_address: String,
    pub seller_address: String,
    pub created_at: DateTime<Utc>,
}

impl TradeRecord {
    /// Whether `address` participated on either side.
    pub fn involves(&self, address: &str) -> bool {
        self.buyer_address == address || self.seller_address == address
    }
}

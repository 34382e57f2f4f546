use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    Balance, OrderRecord, OrderStatus, SettlementRecord, SettlementRole, Side, TradeRecord,
};

pub mod memory;

pub use memory::MemoryStore;

/// Most recent rows returned by trade history queries.
pub const TRADE_HISTORY_LIMIT: usize = 100;

/// Price levels per side returned by book aggregation.
pub const BOOK_DEPTH: usize = 10;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub enum StoreError {
    InsufficientFunds { address: String, asset: String, available: u64, required: u64 },
    Inconsistency(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientFunds { address, asset, available, required } => write!(
                f,
                "Insufficient funds: address {} asset {} available {} required {}",
                address, asset, available, required
            ),
            Self::Inconsistency(msg) => write!(f, "Store inconsistency: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Balance mutations. Each command is one atomic unit.
#[derive(Debug, Clone)]
pub enum BalanceCommand {
    Deposit { address: String, asset: String, amount: u64 },
    Withdraw { address: String, asset: String, amount: u64 },
    Lock { address: String, asset: String, amount: u64 },
    Unlock { address: String, asset: String, amount: u64 },
}

/// One matching step: trade insertion, resting-order update and all balance
/// movements for both counterparties, committed as a single unit.
///
/// `quote_amount` is the buyer's debit and the seller's credit in quote
/// funds; computing it once keeps conservation exact. `buyer_refund` is the
/// taker-buyer's price improvement (limit price above trade price), released
/// from escrow with the fill.
#[derive(Debug, Clone)]
pub struct Fill {
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub maker_order_id: u64,
    pub asset: String,
    pub amount: u64,
    pub price: u64,
    pub quote_amount: u64,
    pub buyer_address: String,
    pub seller_address: String,
    pub buyer_refund: u64,
    pub maker_new_remaining: u64,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub address: Option<String>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    pub asset: Option<String>,
    pub address: Option<String>,
}

/// Aggregated price level of the order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookLevel {
    pub price: u64,
    pub total_remaining: u64,
    pub order_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Result of a conditional cancellation.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled,
    NotCancellable(OrderStatus),
    NotFound,
}

/// Result of driving a settlement through its one allowed transition.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Confirmed(SettlementRecord),
    InsufficientBalance { reason: String },
    AlreadyTerminal,
    NotFound,
}

/// Durable state for balances, orders, trades and settlements. Every method
/// is a single logical atomic unit; callers compose them under their own
/// serialization (the engine holds a per-asset lock across a match loop).
#[async_trait]
pub trait Store: Send + Sync {
    // Balances
    async fn balance(&self, address: &str, asset: &str) -> StoreResult<Balance>;
    async fn balances(&self, address: &str) -> StoreResult<Vec<(String, Balance)>>;
    async fn apply(&self, cmd: BalanceCommand) -> StoreResult<()>;
    /// Seed initial balances. Applied only when the balance table is empty;
    /// returns whether anything was written.
    async fn seed_balances(&self, entries: &[(String, String, u64)]) -> StoreResult<bool>;

    // Settlements
    async fn insert_settlement(&self, record: SettlementRecord) -> StoreResult<()>;
    async fn settlement(&self, id: Uuid) -> StoreResult<Option<SettlementRecord>>;
    async fn settlements(&self) -> StoreResult<Vec<SettlementRecord>>;
    async fn settlements_by_address(
        &self,
        address: &str,
    ) -> StoreResult<Vec<(SettlementRecord, SettlementRole)>>;
    /// The settlement transition: skipped when already terminal (redelivery
    /// guard), failed with a recorded reason when the sender cannot cover the
    /// amount, otherwise debit + credit + confirm in one step.
    async fn apply_settlement(&self, id: Uuid) -> StoreResult<SettlementOutcome>;
    /// Mark a settlement failed. No-op when already terminal.
    async fn fail_settlement(&self, id: Uuid, reason: &str) -> StoreResult<()>;

    // Orders
    async fn next_order_id(&self) -> StoreResult<u64>;
    async fn insert_order(&self, record: OrderRecord) -> StoreResult<()>;
    async fn order(&self, id: u64) -> StoreResult<Option<OrderRecord>>;
    async fn orders(&self, filter: OrderFilter) -> StoreResult<Vec<OrderRecord>>;
    /// Open (pending or partially filled) orders on one side of an asset's
    /// book, best price first, then admission order.
    async fn open_orders(&self, asset: &str, side: Side) -> StoreResult<Vec<OrderRecord>>;
    /// Conditional transition to cancelled; releases the order's remaining
    /// escrow in the same step.
    async fn cancel_order(&self, id: u64) -> StoreResult<CancelOutcome>;

    // Trades
    async fn execute_fill(&self, fill: Fill) -> StoreResult<TradeRecord>;
    async fn trades(&self, filter: TradeFilter) -> StoreResult<Vec<TradeRecord>>;

    // Book aggregation
    async fn book(&self, asset: &str) -> StoreResult<BookSnapshot>;
}

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, info};

use crate::asset_catalog::{base_affordable, quote_value, AssetCatalog, QUOTE_ASSET};
use crate::models::{OrderRecord, OrderStatus, OrderType, Side, TradeRecord};
use crate::store::{BalanceCommand, CancelOutcome, Fill, Store, StoreError};

#[derive(Debug)]
pub enum EngineError {
    UnknownAsset(String),
    InvalidOrder(String),
    InsufficientBalance { asset: String, available: u64, required: u64 },
    OrderNotFound(u64),
    CannotCancel { status: OrderStatus },
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAsset(asset) => write!(f, "Unknown asset: {}", asset),
            Self::InvalidOrder(msg) => write!(f, "{}", msg),
            Self::InsufficientBalance { asset, available, required } => write!(
                f,
                "Insufficient {} balance: available {}, required {}",
                asset, available, required
            ),
            Self::OrderNotFound(id) => write!(f, "Order {} not found", id),
            Self::CannotCancel { status } => {
                write!(f, "Order cannot be cancelled. Current status: {}", status)
            }
            Self::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Store(err)
    }
}

/// Admitted order request in internal units: `amount` raw at the base
/// asset's scale, `price` raw at the quote scale, `None` for market orders.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub address: String,
    pub asset: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: u64,
    pub price: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub order: OrderRecord,
    pub trades: Vec<TradeRecord>,
}

/// Price-time priority matching engine over a `Store`.
///
/// Admission escrows the order's funds, the match loop commits one fill at a
/// time through the store, and a per-asset async mutex serializes the whole
/// of `process_order` (and cancellation) per asset; distinct assets match in
/// parallel.
pub struct MatchingEngine {
    store: Arc<dyn Store>,
    catalog: Arc<AssetCatalog>,
    asset_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<AssetCatalog>) -> Self {
        Self { store, catalog, asset_locks: Mutex::new(HashMap::new()) }
    }

    fn asset_lock(&self, asset: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.asset_locks.lock().unwrap();
        locks
            .entry(asset.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Two orders cross when a market taker meets any resting order, or when
    /// the limit prices overlap. Resting orders always carry a price.
    fn crosses(side: Side, order_type: OrderType, price: Option<u64>, candidate: &OrderRecord) -> bool {
        if order_type == OrderType::Market {
            return true;
        }
        let (Some(limit), Some(candidate_price)) = (price, candidate.price) else {
            return true;
        };
        match side {
            Side::Buy => limit >= candidate_price,
            Side::Sell => limit <= candidate_price,
        }
    }

    /// Admit, match and settle one order. Returns the persisted order and
    /// the trades it generated.
    pub async fn process_order(&self, req: NewOrder) -> Result<OrderOutcome, EngineError> {
        let base_decimals = self
            .catalog
            .decimals(&req.asset)
            .ok_or_else(|| EngineError::UnknownAsset(req.asset.clone()))?;

        if req.amount == 0 {
            return Err(EngineError::InvalidOrder("Amount must be greater than 0".into()));
        }
        match req.order_type {
            OrderType::Limit => {
                if req.price.map_or(true, |p| p == 0) {
                    return Err(EngineError::InvalidOrder(
                        "Limit orders require a positive price".into(),
                    ));
                }
            }
            OrderType::Market => {
                if req.price.is_some() {
                    return Err(EngineError::InvalidOrder(
                        "Market orders must not carry a price".into(),
                    ));
                }
            }
        }

        let lock = self.asset_lock(&req.asset);
        let _guard = lock.lock().await;

        // Escrow. A sell locks the base amount; a limit buy locks its worst
        // case quote cost; a market buy locks the entire available quote
        // balance and releases what the fills do not consume.
        let (reserve_asset, reserve_amount) = match (req.side, req.order_type) {
            (Side::Sell, _) => (req.asset.clone(), req.amount),
            (Side::Buy, OrderType::Limit) => {
                let price = req.price.ok_or_else(|| {
                    EngineError::InvalidOrder("Limit orders require a positive price".into())
                })?;
                let cost = quote_value(req.amount, price, base_decimals).ok_or_else(|| {
                    EngineError::InvalidOrder("Order value overflows the quote scale".into())
                })?;
                if cost == 0 {
                    return Err(EngineError::InvalidOrder(
                        "Order value is below the quote resolution".into(),
                    ));
                }
                (QUOTE_ASSET.to_string(), cost)
            }
            (Side::Buy, OrderType::Market) => {
                let available =
                    self.store.balance(&req.address, QUOTE_ASSET).await?.available;
                if available == 0 {
                    return Err(EngineError::InsufficientBalance {
                        asset: QUOTE_ASSET.to_string(),
                        available: 0,
                        required: 0,
                    });
                }
                (QUOTE_ASSET.to_string(), available)
            }
        };

        self.store
            .apply(BalanceCommand::Lock {
                address: req.address.clone(),
                asset: reserve_asset.clone(),
                amount: reserve_amount,
            })
            .await
            .map_err(|err| match err {
                StoreError::InsufficientFunds { asset, available, required, .. } => {
                    EngineError::InsufficientBalance { asset, available, required }
                }
                other => EngineError::Store(other),
            })?;

        let order_id = self.store.next_order_id().await?;
        let created_at = Utc::now();
        let mut remaining = req.amount;
        let mut reserved = reserve_amount;
        let mut trades = Vec::new();

        // Candidate list is materialized once; every mutation below goes
        // through the store before the next candidate is considered.
        let candidates = self.store.open_orders(&req.asset, req.side.opposite()).await?;
        for candidate in candidates {
            if remaining == 0 {
                break;
            }
            if !Self::crosses(req.side, req.order_type, req.price, &candidate) {
                continue;
            }
            let Some(trade_price) = candidate.price else {
                continue;
            };

            let mut trade_amount = remaining.min(candidate.remaining);
            if req.side == Side::Buy && req.order_type == OrderType::Market {
                // A market buy can only spend what it escrowed.
                let affordable =
                    base_affordable(reserved, trade_price, base_decimals).unwrap_or(0);
                if affordable == 0 {
                    break;
                }
                trade_amount = trade_amount.min(affordable);
            }
            if trade_amount == 0 {
                continue;
            }

            let quote_amount =
                quote_value(trade_amount, trade_price, base_decimals).ok_or_else(|| {
                    StoreError::Inconsistency("Trade value overflows the quote scale".into())
                })?;
            if quote_amount == 0 {
                // Below the quote resolution; nothing would move.
                continue;
            }

            // Trade executes at the resting order's price. A taker buy with a
            // better limit gets the difference released from escrow.
            let buyer_refund = match (req.side, req.price) {
                (Side::Buy, Some(limit)) if limit > trade_price => {
                    quote_value(trade_amount, limit - trade_price, base_decimals).unwrap_or(0)
                }
                _ => 0,
            };

            let (buy_order_id, sell_order_id, buyer_address, seller_address) = match req.side {
                Side::Buy => (
                    order_id,
                    candidate.order_id,
                    req.address.clone(),
                    candidate.address.clone(),
                ),
                Side::Sell => (
                    candidate.order_id,
                    order_id,
                    candidate.address.clone(),
                    req.address.clone(),
                ),
            };

            let trade = self
                .store
                .execute_fill(Fill {
                    buy_order_id,
                    sell_order_id,
                    maker_order_id: candidate.order_id,
                    asset: req.asset.clone(),
                    amount: trade_amount,
                    price: trade_price,
                    quote_amount,
                    buyer_address,
                    seller_address,
                    buyer_refund,
                    maker_new_remaining: candidate.remaining - trade_amount,
                })
                .await?;

            remaining -= trade_amount;
            let taker_spend = match req.side {
                Side::Sell => trade_amount,
                Side::Buy => quote_amount + buyer_refund,
            };
            reserved = reserved.checked_sub(taker_spend).ok_or_else(|| {
                StoreError::Inconsistency(format!(
                    "Taker order {} reservation underflow",
                    order_id
                ))
            })?;

            debug!(
                "order {} matched {} @ {} against order {}",
                order_id, trade.amount, trade.price, candidate.order_id
            );
            trades.push(trade);
        }

        let mut status = if remaining == 0 {
            OrderStatus::Filled
        } else if !trades.is_empty() {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Pending
        };
        // A priceless order cannot rest in a price-keyed book: the unfilled
        // remainder of a market order is cancelled.
        if req.order_type == OrderType::Market && remaining > 0 {
            status = OrderStatus::Cancelled;
        }

        if status.is_terminal() && reserved > 0 {
            self.store
                .apply(BalanceCommand::Unlock {
                    address: req.address.clone(),
                    asset: reserve_asset,
                    amount: reserved,
                })
                .await?;
            reserved = 0;
        }

        let record = OrderRecord {
            order_id,
            address: req.address,
            asset: req.asset,
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            amount: req.amount,
            remaining,
            reserved_remaining: reserved,
            status,
            created_at,
            updated_at: created_at,
        };
        self.store.insert_order(record.clone()).await?;

        info!(
            "order {} {} {} {}: {} trade(s), status {}",
            record.order_id,
            record.side,
            record.order_type,
            record.asset,
            trades.len(),
            record.status
        );

        Ok(OrderOutcome { order: record, trades })
    }

    /// Cancel a live order and release its remaining escrow.
    pub async fn cancel_order(&self, order_id: u64) -> Result<(), EngineError> {
        let record = self
            .store
            .order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))?;

        let lock = self.asset_lock(&record.asset);
        let _guard = lock.lock().await;

        match self.store.cancel_order(order_id).await? {
            CancelOutcome::Cancelled => {
                info!("order {} cancelled", order_id);
                Ok(())
            }
            CancelOutcome::NotCancellable(status) => Err(EngineError::CannotCancel { status }),
            CancelOutcome::NotFound => Err(EngineError::OrderNotFound(order_id)),
        }
    }
}

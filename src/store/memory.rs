use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::asset_catalog::{AssetCatalog, QUOTE_ASSET};
use crate::models::{
    Balance, OrderRecord, OrderStatus, SettlementRecord, SettlementRole, SettlementStatus, Side,
    TradeRecord,
};
use crate::store::{
    BalanceCommand, BookLevel, BookSnapshot, CancelOutcome, Fill, OrderFilter, SettlementOutcome,
    Store, StoreError, StoreResult, TradeFilter, BOOK_DEPTH, TRADE_HISTORY_LIMIT,
};

/// Per-asset price-time index over open limit orders.
/// Bids iterate high to low via `Reverse`; asks low to high. Each level is a
/// FIFO of order ids in admission order.
#[derive(Default)]
struct BookIndex {
    bids: BTreeMap<Reverse<u64>, VecDeque<u64>>,
    asks: BTreeMap<u64, VecDeque<u64>>,
}

impl BookIndex {
    fn insert(&mut self, side: Side, price: u64, order_id: u64) {
        match side {
            Side::Buy => self
                .bids
                .entry(Reverse(price))
                .or_insert_with(VecDeque::new)
                .push_back(order_id),
            Side::Sell => self
                .asks
                .entry(price)
                .or_insert_with(VecDeque::new)
                .push_back(order_id),
        }
    }

    fn remove(&mut self, side: Side, price: u64, order_id: u64) {
        match side {
            Side::Buy => {
                if let Some(queue) = self.bids.get_mut(&Reverse(price)) {
                    queue.retain(|id| *id != order_id);
                    if queue.is_empty() {
                        self.bids.remove(&Reverse(price));
                    }
                }
            }
            Side::Sell => {
                if let Some(queue) = self.asks.get_mut(&price) {
                    queue.retain(|id| *id != order_id);
                    if queue.is_empty() {
                        self.asks.remove(&price);
                    }
                }
            }
        }
    }

    /// Order ids on `side` in price-time priority.
    fn ids(&self, side: Side) -> Vec<u64> {
        match side {
            Side::Buy => self.bids.values().flatten().copied().collect(),
            Side::Sell => self.asks.values().flatten().copied().collect(),
        }
    }
}

#[derive(Default)]
struct Inner {
    accounts: FxHashMap<String, FxHashMap<String, Balance>>,
    settlements: FxHashMap<Uuid, SettlementRecord>,
    settlement_log: Vec<Uuid>,
    orders: FxHashMap<u64, OrderRecord>,
    order_log: Vec<u64>,
    trades: Vec<TradeRecord>,
    books: FxHashMap<String, BookIndex>,
    next_order_id: u64,
    next_trade_id: u64,
}

impl Inner {
    fn balance_mut(&mut self, address: &str, asset: &str) -> &mut Balance {
        self.accounts
            .entry(address.to_string())
            .or_default()
            .entry(asset.to_string())
            .or_default()
    }

    fn balance(&self, address: &str, asset: &str) -> Balance {
        self.accounts
            .get(address)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or_default()
    }

    fn apply_command(&mut self, cmd: &BalanceCommand) -> StoreResult<()> {
        match cmd {
            BalanceCommand::Deposit { address, asset, amount } => self
                .balance_mut(address, asset)
                .deposit(*amount)
                .map_err(|e| StoreError::Inconsistency(e.to_string())),
            BalanceCommand::Withdraw { address, asset, amount } => {
                let bal = self.balance(address, asset);
                if bal.available < *amount {
                    return Err(StoreError::InsufficientFunds {
                        address: address.clone(),
                        asset: asset.clone(),
                        available: bal.available,
                        required: *amount,
                    });
                }
                self.balance_mut(address, asset)
                    .withdraw(*amount)
                    .map_err(|e| StoreError::Inconsistency(e.to_string()))
            }
            BalanceCommand::Lock { address, asset, amount } => {
                let bal = self.balance(address, asset);
                if bal.available < *amount {
                    return Err(StoreError::InsufficientFunds {
                        address: address.clone(),
                        asset: asset.clone(),
                        available: bal.available,
                        required: *amount,
                    });
                }
                self.balance_mut(address, asset)
                    .lock(*amount)
                    .map_err(|e| StoreError::Inconsistency(e.to_string()))
            }
            BalanceCommand::Unlock { address, asset, amount } => self
                .balance_mut(address, asset)
                .unlock(*amount)
                .map_err(|e| StoreError::Inconsistency(e.to_string())),
        }
    }

    /// Remove an order from its book index. Market orders are never indexed.
    fn deindex(&mut self, record: &OrderRecord) {
        if let Some(price) = record.price {
            if let Some(book) = self.books.get_mut(&record.asset) {
                book.remove(record.side, price, record.order_id);
            }
        }
    }
}

/// In-memory `Store`. One mutex guards all state, so every trait method is a
/// single atomic unit; `execute_fill`, `cancel_order` and `apply_settlement`
/// perform their compound record-plus-balance transitions inside one lock
/// acquisition.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    catalog: Arc<AssetCatalog>,
}

impl MemoryStore {
    pub fn new(catalog: Arc<AssetCatalog>) -> Self {
        Self { inner: Mutex::new(Inner::default()), catalog }
    }

    fn format_amount(&self, asset: &str, raw: u64) -> String {
        match self.catalog.to_decimal(asset, raw) {
            Some(dec) => dec.normalize().to_string(),
            None => raw.to_string(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn balance(&self, address: &str, asset: &str) -> StoreResult<Balance> {
        let inner = self.inner.lock().await;
        Ok(inner.balance(address, asset))
    }

    async fn balances(&self, address: &str) -> StoreResult<Vec<(String, Balance)>> {
        let inner = self.inner.lock().await;
        let mut result: Vec<(String, Balance)> = inner
            .accounts
            .get(address)
            .map(|assets| assets.iter().map(|(a, b)| (a.clone(), *b)).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(result)
    }

    async fn apply(&self, cmd: BalanceCommand) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.apply_command(&cmd)
    }

    async fn seed_balances(&self, entries: &[(String, String, u64)]) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.accounts.is_empty() {
            return Ok(false);
        }
        for (address, asset, amount) in entries {
            inner
                .balance_mut(address, asset)
                .deposit(*amount)
                .map_err(|e| StoreError::Inconsistency(e.to_string()))?;
        }
        Ok(true)
    }

    async fn insert_settlement(&self, record: SettlementRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.settlement_log.push(record.id);
        inner.settlements.insert(record.id, record);
        Ok(())
    }

    async fn settlement(&self, id: Uuid) -> StoreResult<Option<SettlementRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.settlements.get(&id).cloned())
    }

    async fn settlements(&self) -> StoreResult<Vec<SettlementRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .settlement_log
            .iter()
            .rev()
            .filter_map(|id| inner.settlements.get(id).cloned())
            .collect())
    }

    async fn settlements_by_address(
        &self,
        address: &str,
    ) -> StoreResult<Vec<(SettlementRecord, SettlementRole)>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .settlement_log
            .iter()
            .rev()
            .filter_map(|id| inner.settlements.get(id))
            .filter_map(|rec| {
                if rec.from == address {
                    Some((rec.clone(), SettlementRole::Sender))
                } else if rec.to == address {
                    Some((rec.clone(), SettlementRole::Receiver))
                } else {
                    None
                }
            })
            .collect())
    }

    async fn apply_settlement(&self, id: Uuid) -> StoreResult<SettlementOutcome> {
        let mut inner = self.inner.lock().await;

        let (from, to, asset, amount) = match inner.settlements.get(&id) {
            None => return Ok(SettlementOutcome::NotFound),
            Some(rec) if rec.status.is_terminal() => return Ok(SettlementOutcome::AlreadyTerminal),
            Some(rec) => (rec.from.clone(), rec.to.clone(), rec.asset.clone(), rec.amount),
        };

        let available = inner.balance(&from, &asset).available;
        if available < amount {
            let reason = format!(
                "Insufficient balance: available {}, required {}",
                self.format_amount(&asset, available),
                self.format_amount(&asset, amount)
            );
            let rec = inner
                .settlements
                .get_mut(&id)
                .ok_or_else(|| StoreError::Inconsistency(format!("Settlement {} vanished", id)))?;
            rec.status = SettlementStatus::Failed;
            rec.reason = Some(reason.clone());
            return Ok(SettlementOutcome::InsufficientBalance { reason });
        }

        // Check the credit side before debiting anything.
        let receiver = inner.balance(&to, &asset);
        if receiver.available.checked_add(amount).is_none() {
            return Err(StoreError::Inconsistency(format!(
                "Balance overflow crediting {} {}",
                to, asset
            )));
        }

        inner
            .balance_mut(&from, &asset)
            .withdraw(amount)
            .map_err(|e| StoreError::Inconsistency(e.to_string()))?;
        inner
            .balance_mut(&to, &asset)
            .deposit(amount)
            .map_err(|e| StoreError::Inconsistency(e.to_string()))?;

        let rec = inner
            .settlements
            .get_mut(&id)
            .ok_or_else(|| StoreError::Inconsistency(format!("Settlement {} vanished", id)))?;
        rec.status = SettlementStatus::Confirmed;
        rec.confirmed_at = Some(Utc::now());
        Ok(SettlementOutcome::Confirmed(rec.clone()))
    }

    async fn fail_settlement(&self, id: Uuid, reason: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(rec) = inner.settlements.get_mut(&id) {
            if !rec.status.is_terminal() {
                rec.status = SettlementStatus::Failed;
                rec.reason = Some(reason.to_string());
            }
        }
        Ok(())
    }

    async fn next_order_id(&self) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.next_order_id += 1;
        Ok(inner.next_order_id)
    }

    async fn insert_order(&self, record: OrderRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if record.status.is_open() {
            if let Some(price) = record.price {
                inner
                    .books
                    .entry(record.asset.clone())
                    .or_default()
                    .insert(record.side, price, record.order_id);
            }
        }
        inner.order_log.push(record.order_id);
        inner.orders.insert(record.order_id, record);
        Ok(())
    }

    async fn order(&self, id: u64) -> StoreResult<Option<OrderRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn orders(&self, filter: OrderFilter) -> StoreResult<Vec<OrderRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .order_log
            .iter()
            .rev()
            .filter_map(|id| inner.orders.get(id))
            .filter(|rec| {
                filter.address.as_deref().map_or(true, |a| rec.address == a)
                    && filter.status.map_or(true, |s| rec.status == s)
            })
            .cloned()
            .collect())
    }

    async fn open_orders(&self, asset: &str, side: Side) -> StoreResult<Vec<OrderRecord>> {
        let inner = self.inner.lock().await;
        let Some(book) = inner.books.get(asset) else {
            return Ok(Vec::new());
        };
        book.ids(side)
            .into_iter()
            .map(|id| {
                inner.orders.get(&id).cloned().ok_or_else(|| {
                    StoreError::Inconsistency(format!("Indexed order {} missing", id))
                })
            })
            .collect()
    }

    async fn cancel_order(&self, id: u64) -> StoreResult<CancelOutcome> {
        let mut inner = self.inner.lock().await;

        let record = match inner.orders.get(&id) {
            None => return Ok(CancelOutcome::NotFound),
            Some(rec) if !rec.status.is_cancellable() => {
                return Ok(CancelOutcome::NotCancellable(rec.status))
            }
            Some(rec) => rec.clone(),
        };

        inner.deindex(&record);

        let refund = record.reserved_remaining;
        if refund > 0 {
            let reserve_asset = record.reserve_asset(QUOTE_ASSET).to_string();
            inner
                .balance_mut(&record.address, &reserve_asset)
                .unlock(refund)
                .map_err(|e| StoreError::Inconsistency(e.to_string()))?;
        }

        let rec = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::Inconsistency(format!("Order {} vanished", id)))?;
        rec.status = OrderStatus::Cancelled;
        rec.reserved_remaining = 0;
        rec.updated_at = Utc::now();
        Ok(CancelOutcome::Cancelled)
    }

    async fn execute_fill(&self, fill: Fill) -> StoreResult<TradeRecord> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        // Resting order first: remaining, reservation, status, index.
        let maker = inner.orders.get(&fill.maker_order_id).cloned().ok_or_else(|| {
            StoreError::Inconsistency(format!("Maker order {} missing", fill.maker_order_id))
        })?;
        if !maker.status.is_open() {
            return Err(StoreError::Inconsistency(format!(
                "Maker order {} is {}",
                maker.order_id, maker.status
            )));
        }

        let maker_is_buyer = fill.maker_order_id == fill.buy_order_id;
        let maker_spend = if maker_is_buyer { fill.quote_amount } else { fill.amount };
        let maker_reserved = maker.reserved_remaining.checked_sub(maker_spend).ok_or_else(|| {
            StoreError::Inconsistency(format!(
                "Maker order {} reservation underflow",
                maker.order_id
            ))
        })?;

        let filled = fill.maker_new_remaining == 0;
        if filled {
            inner.deindex(&maker);
        }

        // Escrow dust left by per-fill truncation is released when the order
        // leaves the book.
        let maker_residual = if filled { maker_reserved } else { 0 };
        if maker_residual > 0 {
            let reserve_asset = maker.reserve_asset(QUOTE_ASSET).to_string();
            inner
                .balance_mut(&maker.address, &reserve_asset)
                .unlock(maker_residual)
                .map_err(|e| StoreError::Inconsistency(e.to_string()))?;
        }

        {
            let rec = inner.orders.get_mut(&fill.maker_order_id).ok_or_else(|| {
                StoreError::Inconsistency(format!("Order {} vanished", fill.maker_order_id))
            })?;
            rec.remaining = fill.maker_new_remaining;
            rec.reserved_remaining = if filled { 0 } else { maker_reserved };
            rec.status = if filled { OrderStatus::Filled } else { OrderStatus::PartiallyFilled };
            rec.updated_at = now;
        }

        // Counterparty balances: base from seller to buyer, quote back.
        inner
            .balance_mut(&fill.buyer_address, QUOTE_ASSET)
            .spend_frozen(fill.quote_amount)
            .map_err(|e| StoreError::Inconsistency(format!("buyer quote: {}", e)))?;
        inner
            .balance_mut(&fill.buyer_address, &fill.asset)
            .deposit(fill.amount)
            .map_err(|e| StoreError::Inconsistency(format!("buyer base: {}", e)))?;
        if fill.buyer_refund > 0 {
            inner
                .balance_mut(&fill.buyer_address, QUOTE_ASSET)
                .unlock(fill.buyer_refund)
                .map_err(|e| StoreError::Inconsistency(format!("buyer refund: {}", e)))?;
        }
        inner
            .balance_mut(&fill.seller_address, &fill.asset)
            .spend_frozen(fill.amount)
            .map_err(|e| StoreError::Inconsistency(format!("seller base: {}", e)))?;
        inner
            .balance_mut(&fill.seller_address, QUOTE_ASSET)
            .deposit(fill.quote_amount)
            .map_err(|e| StoreError::Inconsistency(format!("seller quote: {}", e)))?;

        inner.next_trade_id += 1;
        let trade = TradeRecord {
            trade_id: inner.next_trade_id,
            buy_order_id: fill.buy_order_id,
            sell_order_id: fill.sell_order_id,
            asset: fill.asset,
            amount: fill.amount,
            price: fill.price,
            buyer_address: fill.buyer_address,
            seller_address: fill.seller_address,
            created_at: now,
        };
        inner.trades.push(trade.clone());
        Ok(trade)
    }

    async fn trades(&self, filter: TradeFilter) -> StoreResult<Vec<TradeRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .trades
            .iter()
            .rev()
            .filter(|t| {
                filter.asset.as_deref().map_or(true, |a| t.asset == a)
                    && filter.address.as_deref().map_or(true, |a| t.involves(a))
            })
            .take(TRADE_HISTORY_LIMIT)
            .cloned()
            .collect())
    }

    async fn book(&self, asset: &str) -> StoreResult<BookSnapshot> {
        let inner = self.inner.lock().await;
        let Some(book) = inner.books.get(asset) else {
            return Ok(BookSnapshot::default());
        };

        let aggregate = |price: u64, ids: &VecDeque<u64>| BookLevel {
            price,
            total_remaining: ids
                .iter()
                .filter_map(|id| inner.orders.get(id))
                .map(|o| o.remaining)
                .sum(),
            order_count: ids.len(),
        };

        Ok(BookSnapshot {
            bids: book
                .bids
                .iter()
                .take(BOOK_DEPTH)
                .map(|(Reverse(price), ids)| aggregate(*price, ids))
                .collect(),
            asks: book
                .asks
                .iter()
                .take(BOOK_DEPTH)
                .map(|(price, ids)| aggregate(*price, ids))
                .collect(),
        })
    }
}

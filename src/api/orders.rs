use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use log::error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::validate::{normalize_address, validate_known_asset};
use crate::api::{map_engine_error, order_error_response, AppState, TraceId};
use crate::asset_catalog::{AssetCatalog, QUOTE_ASSET};
use crate::engine::NewOrder;
use crate::models::{
    ApiResponse, ExchangeError, OrderErrorBody, OrderRecord, OrderStatus, OrderType, Side,
    TradeRecord,
};
use crate::store::{BookSnapshot, OrderFilter, TradeFilter};

type OrderError = (StatusCode, Json<OrderErrorBody>);

#[derive(Debug, Deserialize)]
pub struct CreateOrderPayload {
    pub address: String,
    pub asset: String,
    pub side: String,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    #[serde(rename = "type")]
    pub order_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_id: String,
    pub address: String,
    pub asset: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub amount: Decimal,
    pub remaining_amount: Decimal,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    fn from_record(record: &OrderRecord, catalog: &AssetCatalog) -> Self {
        Self {
            order_id: record.order_id.to_string(),
            address: record.address.clone(),
            asset: record.asset.clone(),
            side: record.side,
            order_type: record.order_type,
            amount: catalog.to_decimal(&record.asset, record.amount).unwrap_or_default(),
            remaining_amount: catalog
                .to_decimal(&record.asset, record.remaining)
                .unwrap_or_default(),
            price: record.price.and_then(|p| catalog.price_to_decimal(p)),
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeView {
    pub trade_id: String,
    pub buy_order_id: String,
    pub sell_order_id: String,
    pub asset: String,
    pub amount: Decimal,
    pub price: Decimal,
    pub buyer_address: String,
    pub seller_address: String,
    pub created_at: DateTime<Utc>,
}

impl TradeView {
    fn from_record(record: &TradeRecord, catalog: &AssetCatalog) -> Self {
        Self {
            trade_id: record.trade_id.to_string(),
            buy_order_id: record.buy_order_id.to_string(),
            sell_order_id: record.sell_order_id.to_string(),
            asset: record.asset.clone(),
            amount: catalog.to_decimal(&record.asset, record.amount).unwrap_or_default(),
            price: catalog.price_to_decimal(record.price).unwrap_or_default(),
            buyer_address: record.buyer_address.clone(),
            seller_address: record.seller_address.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacedData {
    pub trade_id: Option<String>,
    pub order_id: String,
    pub trades: Vec<TradeView>,
    pub remaining_amount: Decimal,
}

/// Translate the wire payload into an internal-unit request.
fn admit(payload: &CreateOrderPayload, catalog: &AssetCatalog) -> Result<NewOrder, ExchangeError> {
    let address = normalize_address(&payload.address)?;
    validate_known_asset(catalog, &payload.asset)?;
    if payload.asset == QUOTE_ASSET {
        return Err(ExchangeError::Validation(format!(
            "Cannot trade the quote currency {} against itself",
            QUOTE_ASSET
        )));
    }

    let side = Side::from_str(&payload.side).map_err(ExchangeError::Validation)?;
    let order_type = OrderType::from_str(&payload.order_type).map_err(ExchangeError::Validation)?;

    let amount = catalog
        .to_raw(&payload.asset, payload.amount)
        .map_err(ExchangeError::Validation)?;

    let price = match order_type {
        OrderType::Limit => {
            let price = payload.price.ok_or_else(|| {
                ExchangeError::Validation("Limit orders require a price".to_string())
            })?;
            Some(catalog.price_to_raw(price).map_err(ExchangeError::Validation)?)
        }
        OrderType::Market => {
            if payload.price.is_some() {
                return Err(ExchangeError::Validation(
                    "Market orders must not include a price".to_string(),
                ));
            }
            None
        }
    };

    Ok(NewOrder { address, asset: payload.asset.clone(), side, order_type, amount, price })
}

pub async fn create_order(
    Extension(state): Extension<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Json(payload): Json<CreateOrderPayload>,
) -> Result<(StatusCode, Json<ApiResponse<OrderPlacedData>>), OrderError> {
    let request = admit(&payload, &state.catalog).map_err(|e| order_error_response(&e))?;

    let outcome = state.engine.process_order(request).await.map_err(|err| {
        let err = map_engine_error(err, &state.catalog);
        if !err.is_user_error() {
            error!("[{}] order processing failed: {}", trace.0, err);
        }
        order_error_response(&err)
    })?;

    let trades: Vec<TradeView> =
        outcome.trades.iter().map(|t| TradeView::from_record(t, &state.catalog)).collect();
    let data = OrderPlacedData {
        trade_id: trades.first().map(|t| t.trade_id.clone()),
        order_id: outcome.order.order_id.to_string(),
        remaining_amount: state
            .catalog
            .to_decimal(&outcome.order.asset, outcome.order.remaining)
            .unwrap_or_default(),
        trades,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

#[derive(Debug, Deserialize)]
pub struct OrderListParams {
    pub address: Option<String>,
    pub status: Option<String>,
}

pub async fn list_orders(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<OrderListParams>,
) -> Result<Json<ApiResponse<Vec<OrderView>>>, OrderError> {
    let address = params
        .address
        .as_deref()
        .map(normalize_address)
        .transpose()
        .map_err(|e| order_error_response(&e))?;
    let status = params
        .status
        .as_deref()
        .map(OrderStatus::from_str)
        .transpose()
        .map_err(|e| order_error_response(&ExchangeError::Validation(e)))?;

    let records = state
        .store
        .orders(OrderFilter { address, status })
        .await
        .map_err(|e| order_error_response(&ExchangeError::Internal(e.to_string())))?;

    let views = records.iter().map(|r| OrderView::from_record(r, &state.catalog)).collect();
    Ok(Json(ApiResponse::success(views)))
}

pub async fn get_order(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OrderView>>, OrderError> {
    let order_id = id
        .parse::<u64>()
        .map_err(|_| order_error_response(&ExchangeError::OrderNotFound(0)))?;

    let record = state
        .store
        .order(order_id)
        .await
        .map_err(|e| order_error_response(&ExchangeError::Internal(e.to_string())))?
        .ok_or_else(|| order_error_response(&ExchangeError::OrderNotFound(order_id)))?;

    Ok(Json(ApiResponse::success(OrderView::from_record(&record, &state.catalog))))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

pub async fn cancel_order(
    Extension(state): Extension<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, OrderError> {
    let order_id = id
        .parse::<u64>()
        .map_err(|_| order_error_response(&ExchangeError::OrderNotFound(0)))?;

    state.engine.cancel_order(order_id).await.map_err(|err| {
        let err = map_engine_error(err, &state.catalog);
        if !err.is_user_error() {
            error!("[{}] cancel failed: {}", trace.0, err);
        }
        order_error_response(&err)
    })?;

    Ok(Json(CancelResponse {
        success: true,
        message: format!("Order {} cancelled", order_id),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookLevelView {
    pub price: Decimal,
    pub total_remaining: Decimal,
    pub order_count: usize,
}

#[derive(Debug, Serialize)]
pub struct BookView {
    pub asset: String,
    pub bids: Vec<BookLevelView>,
    pub asks: Vec<BookLevelView>,
    pub timestamp: DateTime<Utc>,
}

fn book_levels(
    levels: &[crate::store::BookLevel],
    asset: &str,
    catalog: &AssetCatalog,
) -> Vec<BookLevelView> {
    levels
        .iter()
        .map(|level| BookLevelView {
            price: catalog.price_to_decimal(level.price).unwrap_or_default(),
            total_remaining: catalog.to_decimal(asset, level.total_remaining).unwrap_or_default(),
            order_count: level.order_count,
        })
        .collect()
}

pub async fn order_book(
    Extension(state): Extension<Arc<AppState>>,
    Path(asset): Path<String>,
) -> Result<Json<ApiResponse<BookView>>, OrderError> {
    validate_known_asset(&state.catalog, &asset).map_err(|e| order_error_response(&e))?;

    let BookSnapshot { bids, asks } = state
        .store
        .book(&asset)
        .await
        .map_err(|e| order_error_response(&ExchangeError::Internal(e.to_string())))?;

    Ok(Json(ApiResponse::success(BookView {
        bids: book_levels(&bids, &asset, &state.catalog),
        asks: book_levels(&asks, &asset, &state.catalog),
        asset,
        timestamp: Utc::now(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct TradeListParams {
    pub asset: Option<String>,
    pub address: Option<String>,
}

pub async fn list_trades(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<TradeListParams>,
) -> Result<Json<ApiResponse<Vec<TradeView>>>, OrderError> {
    if let Some(asset) = params.asset.as_deref() {
        validate_known_asset(&state.catalog, asset).map_err(|e| order_error_response(&e))?;
    }
    let address = params
        .address
        .as_deref()
        .map(normalize_address)
        .transpose()
        .map_err(|e| order_error_response(&e))?;

    let records = state
        .store
        .trades(TradeFilter { asset: params.asset, address })
        .await
        .map_err(|e| order_error_response(&ExchangeError::Internal(e.to_string())))?;

    let views = records.iter().map(|t| TradeView::from_record(t, &state.catalog)).collect();
    Ok(Json(ApiResponse::success(views)))
}

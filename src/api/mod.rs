use std::sync::Arc;

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use log::info;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::asset_catalog::AssetCatalog;
use crate::bus::EventBus;
use crate::engine::{EngineError, MatchingEngine};
use crate::models::{ErrorBody, ExchangeError, OrderErrorBody};
use crate::store::Store;

pub mod assets;
pub mod balances;
pub mod orders;
pub mod settlements;
pub mod validate;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub bus: Arc<dyn EventBus>,
    pub engine: Arc<MatchingEngine>,
    pub catalog: Arc<AssetCatalog>,
}

/// Per-request correlation id, echoed in log lines and the `x-trace-id`
/// response header.
#[derive(Debug, Clone, Copy)]
pub struct TraceId(pub Uuid);

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/settle", post(settlements::settle))
        .route("/api/settlements", get(settlements::list_settlements))
        .route("/api/settlements/address/:address", get(settlements::settlements_by_address))
        .route("/api/settlements/:id", get(settlements::get_settlement))
        .route("/api/balance/:address", get(balances::get_balance))
        .route("/api/balance/:address/all", get(balances::get_all_balances))
        .route("/api/assets", get(assets::list_assets))
        .route("/api/orders", post(orders::create_order).get(orders::list_orders))
        .route("/api/orders/book/:asset", get(orders::order_book))
        .route("/api/orders/:id", get(orders::get_order))
        .route("/api/orders/:id/cancel", post(orders::cancel_order))
        .route("/api/trades", get(orders::list_trades))
        .layer(middleware::from_fn(trace_requests))
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

async fn trace_requests(mut req: Request, next: Next) -> Response {
    let trace_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(TraceId(trace_id));

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
        response.headers_mut().insert("x-trace-id", value);
    }
    info!("[{}] {} {} {}", trace_id, method, path, response.status().as_u16());
    response
}

fn http_status(err: &ExchangeError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// `{error, message, statusCode}` body, used by the settlement, balance and
/// asset routes.
pub fn error_response(err: &ExchangeError) -> (StatusCode, Json<ErrorBody>) {
    (
        http_status(err),
        Json(ErrorBody {
            error: err.error_code().to_string(),
            message: err.to_string(),
            status_code: err.status_code(),
        }),
    )
}

/// `{success: false, error, message}` body, used by the order and trade
/// routes.
pub fn order_error_response(err: &ExchangeError) -> (StatusCode, Json<OrderErrorBody>) {
    (http_status(err), Json(OrderErrorBody::new(err.error_code(), err.to_string())))
}

/// Lower engine errors into API error kinds, converting raw amounts back to
/// client units for the message.
pub fn map_engine_error(err: EngineError, catalog: &AssetCatalog) -> ExchangeError {
    match err {
        EngineError::UnknownAsset(asset) => {
            ExchangeError::Validation(format!("Unknown asset: {}", asset))
        }
        EngineError::InvalidOrder(msg) => ExchangeError::Validation(msg),
        EngineError::InsufficientBalance { asset, available, required } => {
            let fmt = |raw: u64| {
                catalog
                    .to_decimal(&asset, raw)
                    .map(|d| d.normalize().to_string())
                    .unwrap_or_else(|| raw.to_string())
            };
            ExchangeError::InsufficientBalance {
                available: fmt(available),
                required: fmt(required),
                asset,
            }
        }
        EngineError::OrderNotFound(id) => ExchangeError::OrderNotFound(id),
        EngineError::CannotCancel { status } => ExchangeError::CannotCancel { status },
        EngineError::Store(err) => ExchangeError::Internal(err.to_string()),
    }
}

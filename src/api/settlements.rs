use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use log::error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::validate::{normalize_address, validate_known_asset};
use crate::api::{error_response, AppState, TraceId};
use crate::asset_catalog::AssetCatalog;
use crate::bus::topics;
use crate::models::{
    ErrorBody, ExchangeError, SettlementRecord, SettlementRequested, SettlementRole,
    SettlementStatus,
};

type SettlementError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Deserialize)]
pub struct SettlePayload {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub asset: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleAccepted {
    pub settlement_id: String,
    pub status: SettlementStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementView {
    pub id: String,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub asset: String,
    pub status: SettlementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl SettlementView {
    fn from_record(record: &SettlementRecord, catalog: &AssetCatalog) -> Self {
        Self {
            id: record.id.to_string(),
            from: record.from.clone(),
            to: record.to.clone(),
            amount: catalog.to_decimal(&record.asset, record.amount).unwrap_or_default(),
            asset: record.asset.clone(),
            status: record.status,
            reason: record.reason.clone(),
            created_at: record.created_at,
            confirmed_at: record.confirmed_at,
        }
    }
}

pub async fn settle(
    Extension(state): Extension<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Json(payload): Json<SettlePayload>,
) -> Result<(StatusCode, Json<SettleAccepted>), SettlementError> {
    let from = normalize_address(&payload.from).map_err(|e| error_response(&e))?;
    let to = normalize_address(&payload.to).map_err(|e| error_response(&e))?;
    if from == to {
        return Err(error_response(&ExchangeError::Validation(
            "Sender and receiver must be distinct".to_string(),
        )));
    }
    validate_known_asset(&state.catalog, &payload.asset).map_err(|e| error_response(&e))?;
    let amount = state
        .catalog
        .to_raw(&payload.asset, payload.amount)
        .map_err(|e| error_response(&ExchangeError::Validation(e)))?;

    let record = SettlementRecord {
        id: Uuid::new_v4(),
        from: from.clone(),
        to: to.clone(),
        amount,
        asset: payload.asset.clone(),
        status: SettlementStatus::Pending,
        reason: None,
        created_at: Utc::now(),
        confirmed_at: None,
    };
    let id = record.id;

    state.store.insert_settlement(record).await.map_err(|e| {
        error!("[{}] settlement insert failed: {}", trace.0, e);
        error_response(&ExchangeError::Internal(e.to_string()))
    })?;

    let event = SettlementRequested { id, from, to, amount, asset: payload.asset };
    let payload = serde_json::to_value(&event)
        .map_err(|e| error_response(&ExchangeError::Internal(e.to_string())))?;
    state.bus.publish(topics::SETTLEMENT_REQUESTS, payload).await.map_err(|e| {
        error!("[{}] settlement publish failed: {}", trace.0, e);
        error_response(&ExchangeError::Internal(e))
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SettleAccepted { settlement_id: id.to_string(), status: SettlementStatus::Pending }),
    ))
}

pub async fn list_settlements(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<SettlementView>>, SettlementError> {
    let records = state
        .store
        .settlements()
        .await
        .map_err(|e| error_response(&ExchangeError::Internal(e.to_string())))?;
    Ok(Json(records.iter().map(|r| SettlementView::from_record(r, &state.catalog)).collect()))
}

pub async fn get_settlement(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SettlementView>, SettlementError> {
    let settlement_id = Uuid::parse_str(&id)
        .map_err(|_| error_response(&ExchangeError::SettlementNotFound(id.clone())))?;

    let record = state
        .store
        .settlement(settlement_id)
        .await
        .map_err(|e| error_response(&ExchangeError::Internal(e.to_string())))?
        .ok_or_else(|| error_response(&ExchangeError::SettlementNotFound(id)))?;

    Ok(Json(SettlementView::from_record(&record, &state.catalog)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementWithRole {
    #[serde(flatten)]
    pub settlement: SettlementView,
    pub role: SettlementRole,
}

#[derive(Debug, Serialize)]
pub struct AddressSettlements {
    pub address: String,
    pub settlements: Vec<SettlementWithRole>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

pub async fn settlements_by_address(
    Extension(state): Extension<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<AddressSettlements>, SettlementError> {
    let address = normalize_address(&address).map_err(|e| error_response(&e))?;

    let records = state
        .store
        .settlements_by_address(&address)
        .await
        .map_err(|e| error_response(&ExchangeError::Internal(e.to_string())))?;

    let settlements: Vec<SettlementWithRole> = records
        .iter()
        .map(|(record, role)| SettlementWithRole {
            settlement: SettlementView::from_record(record, &state.catalog),
            role: *role,
        })
        .collect();

    Ok(Json(AddressSettlements {
        address,
        total: settlements.len(),
        settlements,
        timestamp: Utc::now(),
    }))
}

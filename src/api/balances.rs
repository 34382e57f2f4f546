use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::validate::{normalize_address, validate_known_asset};
use crate::api::{error_response, AppState};
use crate::models::{ErrorBody, ExchangeError};

type BalanceError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Deserialize)]
pub struct BalanceParams {
    pub asset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub address: String,
    pub asset: String,
    pub balance: Decimal,
}

pub async fn get_balance(
    Extension(state): Extension<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<BalanceParams>,
) -> Result<Json<BalanceView>, BalanceError> {
    let address = normalize_address(&address).map_err(|e| error_response(&e))?;
    let asset = params.asset.ok_or_else(|| {
        error_response(&ExchangeError::Validation("Query parameter 'asset' is required".into()))
    })?;
    validate_known_asset(&state.catalog, &asset).map_err(|e| error_response(&e))?;

    let balance = state
        .store
        .balance(&address, &asset)
        .await
        .map_err(|e| error_response(&ExchangeError::Internal(e.to_string())))?;

    Ok(Json(BalanceView {
        address,
        balance: state.catalog.to_decimal(&asset, balance.available).unwrap_or_default(),
        asset,
    }))
}

#[derive(Debug, Serialize)]
pub struct BalanceEntry {
    pub asset: String,
    pub balance: Decimal,
    pub frozen: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AddressBalances {
    pub address: String,
    pub balances: Vec<BalanceEntry>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

pub async fn get_all_balances(
    Extension(state): Extension<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<AddressBalances>, BalanceError> {
    let address = normalize_address(&address).map_err(|e| error_response(&e))?;

    let entries = state
        .store
        .balances(&address)
        .await
        .map_err(|e| error_response(&ExchangeError::Internal(e.to_string())))?;

    let balances: Vec<BalanceEntry> = entries
        .iter()
        .map(|(asset, balance)| BalanceEntry {
            asset: asset.clone(),
            balance: state.catalog.to_decimal(asset, balance.available).unwrap_or_default(),
            frozen: state.catalog.to_decimal(asset, balance.frozen).unwrap_or_default(),
        })
        .collect();

    Ok(Json(AddressBalances {
        address,
        total: balances.len(),
        balances,
        timestamp: Utc::now(),
    }))
}

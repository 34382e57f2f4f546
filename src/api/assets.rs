use std::sync::Arc;

use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::AppState;
use crate::asset_catalog::AssetInfo;

#[derive(Debug, Serialize)]
pub struct AssetsView {
    pub assets: Vec<AssetInfo>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

pub async fn list_assets(Extension(state): Extension<Arc<AppState>>) -> Json<AssetsView> {
    let assets = state.catalog.assets().to_vec();
    Json(AssetsView { total: assets.len(), assets, timestamp: Utc::now() })
}

//! Provider status handlers

use crate::AppState;
use axum::{extract::State, Json};
use clinsight_common::models::{ProviderHealth, StatusMap};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
pub struct ProviderStatusResponse {
    pub providers: BTreeMap<String, ProviderHealth>,
}

#[derive(Serialize)]
pub struct RecentStatusResponse {
    pub providers: StatusMap,
}

/// Check every registered provider now
pub async fn status(State(state): State<AppState>) -> Json<ProviderStatusResponse> {
    Json(ProviderStatusResponse {
        providers: state.engine.provider_status().await,
    })
}

/// Outcomes observed during the most recent fetches
pub async fn recent(State(state): State<AppState>) -> Json<RecentStatusResponse> {
    Json(RecentStatusResponse {
        providers: state.engine.recent_status().await,
    })
}

//! Drug interaction handler

use crate::AppState;
use axum::{extract::State, Json};
use clinsight_common::errors::{AppError, Result};
use clinsight_intelligence::InteractionReport;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct InteractionsRequest {
    #[validate(length(min = 2, max = 20))]
    pub drugs: Vec<String>,
}

/// Check a drug list pairwise against label safety sections
pub async fn interactions(
    State(state): State<AppState>,
    Json(request): Json<InteractionsRequest>,
) -> Result<Json<InteractionReport>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("drugs".to_string()),
    })?;

    let report = state.engine.interactions(&request.drugs).await?;
    Ok(Json(report))
}

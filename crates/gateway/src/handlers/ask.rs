//! Evidence synthesis and routing handlers

use crate::AppState;
use axum::{extract::State, Json};
use clinsight_common::errors::{AppError, Result};
use clinsight_intelligence::{RouteOutcome, RoutePlan, SynthesisResult};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Free-text clinical question
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub query: String,
    pub plan: RoutePlan,
}

/// Answer a question with a scored evidence summary
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<SynthesisResult>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("query".to_string()),
    })?;

    let result = state.engine.ask(&request.query).await?;

    tracing::info!(
        entity = %result.entity,
        confidence = result.confidence_score,
        degraded = ?result.degraded,
        "Synthesis answered"
    );

    Ok(Json(result))
}

/// Show how a question would be routed without fetching anything
pub async fn route(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<RouteResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("query".to_string()),
    })?;

    match state.engine.route(&request.query).await {
        RouteOutcome::Routed(plan) => Ok(Json(RouteResponse {
            query: request.query,
            plan,
        })),
        RouteOutcome::NoEntityFound => Err(AppError::NoEntityFound {
            query: request.query,
        }),
    }
}

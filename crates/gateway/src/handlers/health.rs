//! Health check handlers

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub providers: ProvidersCheck,
    pub cache: CheckResult,
}

#[derive(Serialize)]
pub struct ProvidersCheck {
    pub status: String,
    pub registered: Vec<String>,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness check - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: clinsight_common::VERSION,
    })
}

/// Readiness check - at least one provider registered and the cache answering
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let registered = state.engine.provider_names().await;
    let providers = ProvidersCheck {
        status: if registered.is_empty() { "down" } else { "up" }.to_string(),
        registered,
    };

    let start = std::time::Instant::now();
    let cache = state.engine.cache();
    cache.set("health:ready", &true).await;
    let cache_check = match cache.get::<bool>("health:ready").await {
        Some(true) => CheckResult {
            status: "up".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        _ => CheckResult {
            status: "down".to_string(),
            latency_ms: None,
            error: Some("cache entry not readable".to_string()),
        },
    };

    let all_healthy = providers.status == "up" && cache_check.status == "up";
    let code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(ReadyResponse {
            status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
            checks: HealthChecks {
                providers,
                cache: cache_check,
            },
        }),
    )
}

/// Prometheus scrape endpoint
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

//! Relationship graph handler

use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use clinsight_common::errors::{AppError, Result};
use clinsight_intelligence::Graph;

const MAX_ENTITY_LEN: usize = 200;

/// Build the drug/trial/paper/condition graph around one entity
pub async fn graph(State(state): State<AppState>, Path(entity): Path<String>) -> Result<Json<Graph>> {
    let entity = entity.trim();
    if entity.is_empty() || entity.len() > MAX_ENTITY_LEN {
        return Err(AppError::validation(
            "entity",
            format!("entity must be between 1 and {} characters", MAX_ENTITY_LEN),
        ));
    }

    let graph = state.engine.graph(entity).await?;
    tracing::debug!(
        entity,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Graph built"
    );

    Ok(Json(graph))
}

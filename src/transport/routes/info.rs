use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub sessions: usize,
    pub viewers: usize,
    pub tokens: usize,
}

/// GET /health
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Health> {
    tracing::debug!("GET /health");
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.registry.len(),
        viewers: state.hub.viewer_count(),
        tokens: state.tokens.len(),
    })
}

/// GET /version
pub async fn get_version() -> String {
    tracing::debug!("GET /version");
    env!("CARGO_PKG_VERSION").to_string()
}

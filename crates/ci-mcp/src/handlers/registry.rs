//! Registry group (spec.md §6.2): reload, status, save.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::McpResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ReloadResponse {
    before: usize,
    after: usize,
}

pub async fn reload(State(state): State<AppState>) -> McpResult<Json<ReloadResponse>> {
    let counts = state.registry.reload().await?;
    Ok(Json(ReloadResponse {
        before: counts.before,
        after: counts.after,
    }))
}

#[derive(Serialize)]
pub struct RegistryStatus {
    path: String,
    entry_count: usize,
}

pub async fn status(State(state): State<AppState>) -> Json<RegistryStatus> {
    Json(RegistryStatus {
        path: state.registry.path().display().to_string(),
        entry_count: state.registry.list(&ci_registry::ListFilter::default()).len(),
    })
}

pub async fn save(State(state): State<AppState>) -> McpResult<Json<serde_json::Value>> {
    state.registry.save().await?;
    Ok(Json(serde_json::json!({ "saved": true })))
}

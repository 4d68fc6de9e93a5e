//! Context state group (spec.md §6.2): staged/next prompt inspection and patching.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use ci_core::{ContextPatch, ContextState, CoreError};

use crate::error::{McpError, McpResult};
use crate::state::AppState;

pub async fn get_context_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> McpResult<Json<ContextState>> {
    if state.registry.get(&name).is_none() {
        return Err(McpError::Core(CoreError::UnknownCi(name)));
    }
    Ok(Json(state.registry.get_context(&name).unwrap_or_default()))
}

pub async fn set_context_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(patch): Json<ContextPatch>,
) -> McpResult<Json<serde_json::Value>> {
    state.registry.set_context(&name, patch).await?;
    Ok(Json(serde_json::json!({ "updated": name })))
}

pub async fn all_context_states(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, ContextState>> {
    let mut map = BTreeMap::new();
    for entry in state.registry.list(&ci_registry::ListFilter::default()) {
        if let Some(context) = state.registry.get_context(&entry.name) {
            map.insert(entry.name, context);
        }
    }
    Json(map)
}

pub async fn promote_staged(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> McpResult<Json<serde_json::Value>> {
    state.registry.promote_staged(&name).await?;
    Ok(Json(serde_json::json!({ "promoted": name })))
}

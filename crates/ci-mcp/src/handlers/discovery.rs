//! Discovery group (spec.md §6.2): `GET /health`, `GET /capabilities`.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
    registered_cis: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let registered = state.registry.list(&ci_registry::ListFilter::default()).len();
    Json(HealthBody {
        status: "ok",
        registered_cis: registered,
    })
}

/// Self-describing map of every endpoint this server exposes, grouped the
/// way spec.md §6.2 groups them. Not a generated OpenAPI document (see
/// SPEC_FULL.md §6): a small fixed surface documents itself fine as JSON.
pub async fn capabilities() -> Json<Value> {
    Json(json!({
        "base_path": "/api/mcp/v2",
        "groups": {
            "discovery": ["GET /health", "GET /capabilities"],
            "messaging": ["POST /tools/send-message", "POST /tools/team-chat"],
            "ci_info": [
                "POST /tools/list-ais",
                "GET /tools/ci/{name}",
                "GET /tools/ci-types",
                "GET /tools/cis/type/{type}",
                "GET /tools/ci/{name}/exists",
            ],
            "tool_lifecycle": [
                "GET /tools/ci-tools",
                "POST /tools/ci-tools/launch",
                "POST /tools/ci-tools/terminate",
                "GET /tools/ci-tools/status/{name}",
                "GET /tools/ci-tools/instances",
                "POST /tools/ci-tools/define",
                "DELETE /tools/ci-tools/{name}",
                "GET /tools/ci-tools/capabilities/{name}",
            ],
            "context_state": [
                "GET /tools/context-state/{name}",
                "POST /tools/context-state/{name}",
                "GET /tools/context-states",
                "POST /tools/context-state/{name}/promote-staged",
            ],
            "forwarding": ["POST /tools/forward"],
            "registry": [
                "POST /tools/registry/reload",
                "GET /tools/registry/status",
                "POST /tools/registry/save",
            ],
        },
    }))
}

//! Forwarding group (spec.md §6.2): `POST /tools/forward` with an `action` tag.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Action {
    List,
    Add,
    Remove,
}

#[derive(Deserialize)]
pub struct ForwardRequest {
    action: Action,
    #[serde(default)]
    ai_name: Option<String>,
    #[serde(default)]
    terminal: Option<String>,
}

#[derive(Serialize)]
pub struct ForwardResponse {
    forwards: Vec<(String, String)>,
}

pub async fn forward(
    State(state): State<AppState>,
    Json(req): Json<ForwardRequest>,
) -> McpResult<Json<ForwardResponse>> {
    match req.action {
        Action::List => Ok(Json(ForwardResponse {
            forwards: state.router.list_forwards(),
        })),
        Action::Add => {
            let ai_name = req
                .ai_name
                .ok_or_else(|| McpError::BadRequest("ai_name is required for add".to_string()))?;
            let terminal = req
                .terminal
                .ok_or_else(|| McpError::BadRequest("terminal is required for add".to_string()))?;
            state.router.add_forward(&ai_name, &terminal);
            Ok(Json(ForwardResponse {
                forwards: state.router.list_forwards(),
            }))
        }
        Action::Remove => {
            let ai_name = req
                .ai_name
                .ok_or_else(|| McpError::BadRequest("ai_name is required for remove".to_string()))?;
            state.router.remove_forward(&ai_name)?;
            Ok(Json(ForwardResponse {
                forwards: state.router.list_forwards(),
            }))
        }
    }
}

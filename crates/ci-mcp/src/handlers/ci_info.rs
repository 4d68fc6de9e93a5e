//! CI info group (spec.md §6.2): listing, lookup, and type-filtered queries.

use axum::extract::{Path, State};
use axum::Json;
use ci_core::{CiEntry, CiType};
use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListAisRequest {
    #[serde(default)]
    ci_type: Option<String>,
}

pub async fn list_ais(
    State(state): State<AppState>,
    Json(req): Json<ListAisRequest>,
) -> McpResult<Json<Vec<CiEntry>>> {
    let ci_type = req.ci_type.as_deref().map(parse_ci_type).transpose()?;
    let entries = state.registry.list(&ci_registry::ListFilter {
        ci_type,
        defined_by: None,
        include_hidden: false,
    });
    Ok(Json(entries))
}

pub async fn get_ci(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> McpResult<Json<CiEntry>> {
    state
        .registry
        .get(&name)
        .map(Json)
        .ok_or_else(|| McpError::Core(ci_core::CoreError::UnknownCi(name)))
}

#[derive(Serialize)]
pub struct ExistsResponse {
    exists: bool,
}

pub async fn ci_exists(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<ExistsResponse> {
    Json(ExistsResponse {
        exists: state.registry.get(&name).is_some(),
    })
}

pub async fn ci_types() -> Json<Vec<&'static str>> {
    Json(vec!["greek", "terminal", "project", "tool"])
}

pub async fn cis_of_type(
    State(state): State<AppState>,
    Path(ci_type): Path<String>,
) -> McpResult<Json<Vec<CiEntry>>> {
    let ci_type = parse_ci_type(&ci_type)?;
    let entries = state.registry.list(&ci_registry::ListFilter {
        ci_type: Some(ci_type),
        defined_by: None,
        include_hidden: false,
    });
    Ok(Json(entries))
}

fn parse_ci_type(raw: &str) -> McpResult<CiType> {
    match raw {
        "greek" => Ok(CiType::Greek),
        "terminal" => Ok(CiType::Terminal),
        "project" => Ok(CiType::Project),
        "tool" => Ok(CiType::Tool),
        other => Err(McpError::BadRequest(format!("unknown CI type: {other}"))),
    }
}

//! Tool lifecycle group (spec.md §6.2): launch/terminate/status/define backed
//! by the Tool Supervisor.

use std::collections::{BTreeMap, BTreeSet};

use axum::extract::{Path, State};
use axum::Json;
use ci_core::{CoreError, ToolInstance};
use ci_supervisor::ToolDefinition;
use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};
use crate::state::AppState;

pub async fn list_defined(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, ToolDefinition>> {
    Json(state.supervisor.definitions())
}

#[derive(Deserialize)]
pub struct LaunchRequest {
    tool_name: String,
    #[serde(default)]
    #[allow(dead_code)]
    session_id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    instance_name: Option<String>,
}

#[derive(Serialize)]
pub struct LaunchResponse {
    port: u16,
}

pub async fn launch(
    State(state): State<AppState>,
    Json(req): Json<LaunchRequest>,
) -> McpResult<Json<LaunchResponse>> {
    let port = state.supervisor.launch(&req.tool_name).await?;
    state.health.record_activity(&req.tool_name);
    Ok(Json(LaunchResponse { port }))
}

#[derive(Deserialize)]
pub struct TerminateRequest {
    tool_name: String,
}

pub async fn terminate(
    State(state): State<AppState>,
    Json(req): Json<TerminateRequest>,
) -> McpResult<Json<serde_json::Value>> {
    state.supervisor.terminate(&req.tool_name).await?;
    Ok(Json(serde_json::json!({ "terminated": req.tool_name })))
}

pub async fn status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> McpResult<Json<ToolInstance>> {
    state
        .supervisor
        .status(&name)
        .map(Json)
        .ok_or_else(|| McpError::Core(CoreError::NotRunning(name)))
}

pub async fn instances(State(state): State<AppState>) -> Json<Vec<ToolInstance>> {
    Json(state.supervisor.instances())
}

#[derive(Deserialize)]
pub struct DefineOptions {
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    capabilities: BTreeSet<String>,
    #[serde(default)]
    launch_args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    health_check: Option<String>,
    #[serde(default)]
    delimiter: Option<String>,
    #[serde(default)]
    os_injection: bool,
    #[serde(default)]
    auto_restart: Option<bool>,
}

#[derive(Deserialize)]
pub struct DefineRequest {
    name: String,
    #[serde(rename = "type")]
    adapter_kind: String,
    executable: String,
    #[serde(default)]
    options: DefineOptions,
}

impl Default for DefineOptions {
    fn default() -> Self {
        Self {
            port: None,
            capabilities: BTreeSet::new(),
            launch_args: Vec::new(),
            env: BTreeMap::new(),
            health_check: None,
            delimiter: None,
            os_injection: false,
            auto_restart: None,
        }
    }
}

pub async fn define(
    State(state): State<AppState>,
    Json(req): Json<DefineRequest>,
) -> McpResult<Json<serde_json::Value>> {
    let definition = ToolDefinition {
        name: req.name.clone(),
        adapter_kind: req.adapter_kind,
        executable: req.executable,
        launch_args: req.options.launch_args,
        env: req.options.env,
        port_hint: req.options.port,
        capabilities: req.options.capabilities,
        health_check: req.options.health_check.unwrap_or_else(|| "none".to_string()),
        delimiter: req.options.delimiter.unwrap_or_default(),
        os_injection: req.options.os_injection,
        auto_restart: req.options.auto_restart.unwrap_or(true),
    };
    state.supervisor.define(definition)?;
    Ok(Json(serde_json::json!({ "defined": req.name })))
}

pub async fn undefine(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> McpResult<Json<serde_json::Value>> {
    state.supervisor.undefine(&name)?;
    Ok(Json(serde_json::json!({ "undefined": name })))
}

pub async fn capabilities_of(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> McpResult<Json<BTreeSet<String>>> {
    state
        .supervisor
        .definitions()
        .get(&name)
        .map(|d| Json(d.capabilities.clone()))
        .ok_or_else(|| McpError::Core(CoreError::UnknownCi(name)))
}

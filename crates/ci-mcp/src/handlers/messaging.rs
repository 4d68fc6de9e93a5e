//! Messaging group (spec.md §6.2): `POST /tools/send-message`, `POST /tools/team-chat`.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ci_core::Message;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{McpError, McpResult};
use crate::state::AppState;

const SSE_KEEP_ALIVE_SECS: u64 = 15;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    ai_name: String,
    message: String,
    #[serde(default)]
    stream: bool,
    #[serde(default)]
    execute: bool,
    #[serde(default)]
    delimiter: Option<String>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    response: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> McpResult<Response> {
    let mut message = Message::chat("mcp-client", &req.ai_name, req.message);
    message.execute = req.execute;
    message.delimiter = req.delimiter;

    if req.stream {
        let rx = state
            .router
            .send_stream(&req.ai_name, message)
            .await
            .map_err(McpError::Dispatch)?;
        return Ok(sse_from_chunks(rx).into_response());
    }

    let response = state
        .router
        .send(&req.ai_name, message)
        .await
        .map_err(McpError::Dispatch)?;
    state.health.record_activity(&req.ai_name);
    Ok(Json(SendMessageResponse { response }).into_response())
}

fn sse_from_chunks(
    rx: tokio::sync::mpsc::Receiver<String>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let chunks = ReceiverStream::new(rx).map(|delta| {
        Ok(Event::default().data(format!(
            r#"{{"done": false, "delta": {}}}"#,
            serde_json::Value::String(delta)
        )))
    });
    let done = tokio_stream::once(Ok(Event::default().data(r#"{"done": true}"#)));
    Sse::new(chunks.chain(done)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS))
            .text("keep-alive"),
    )
}

#[derive(Deserialize)]
pub struct TeamChatRequest {
    message: String,
}

#[derive(Serialize)]
struct TeamChatEntry {
    name: String,
    response: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
pub struct TeamChatResponse {
    responses: Vec<TeamChatEntry>,
}

pub async fn team_chat(
    State(state): State<AppState>,
    Json(req): Json<TeamChatRequest>,
) -> McpResult<Json<TeamChatResponse>> {
    let message = Message::chat("mcp-client", "team", req.message);
    let outcomes = state.router.broadcast(message).await;

    let responses = outcomes
        .into_iter()
        .map(|outcome| match outcome.result {
            Ok(response) => TeamChatEntry {
                name: outcome.name,
                response: Some(response),
                error: None,
            },
            Err(e) => TeamChatEntry {
                name: outcome.name,
                response: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(Json(TeamChatResponse { responses }))
}

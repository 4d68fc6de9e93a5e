//! MCP-specific error kind, layered over every component crate's own error
//! (spec.md §6.2 "all errors return `{detail, code}` with standard HTTP
//! statuses").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type McpResult<T> = std::result::Result<T, McpError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum McpError {
    #[error(transparent)]
    Core(#[from] ci_core::CoreError),

    #[error(transparent)]
    Router(#[from] ci_router::RouterError),

    /// Same underlying [`ci_router::RouterError`] as [`Self::Router`], raised
    /// from the send-message dispatch path specifically: spec.md §8 S6
    /// requires `unknown_ci` to surface as 500 there (a dispatch-time miss
    /// is treated as a faulted send, not a missing resource), while every
    /// other caller of the Unified Router keeps the usual 404.
    #[error(transparent)]
    Dispatch(ci_router::RouterError),

    #[error(transparent)]
    Supervisor(#[from] ci_supervisor::SupervisorError),

    #[error(transparent)]
    Health(#[from] ci_health::HealthError),

    #[error("malformed request body: {0}")]
    BadRequest(String),
}

impl McpError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.code(),
            Self::Router(e) => e.code(),
            Self::Dispatch(e) => e.code(),
            Self::Supervisor(e) => e.code(),
            Self::Health(e) => e.code(),
            Self::BadRequest(_) => "invalid",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        let code = match self {
            Self::Core(e) => e.http_status(),
            Self::Router(ci_router::RouterError::Core(e)) => e.http_status(),
            // spec.md §8 S6: unknown_ci on the send-message path is 500, not
            // the 404 every other unknown-CI lookup gets.
            Self::Dispatch(ci_router::RouterError::Core(ci_core::CoreError::UnknownCi(_))) => 500,
            Self::Dispatch(ci_router::RouterError::Core(e)) => e.http_status(),
            Self::Supervisor(ci_supervisor::SupervisorError::Core(e)) => e.http_status(),
            Self::Supervisor(ci_supervisor::SupervisorError::NotFound(_)) => 404,
            Self::Supervisor(ci_supervisor::SupervisorError::ExecutableUnavailable(_)) => 404,
            Self::Health(ci_health::HealthError::Core(e)) => e.http_status(),
            Self::BadRequest(_) => 400,
            _ => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    detail: String,
    code: &'static str,
}

impl IntoResponse for McpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorEnvelope {
            detail: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

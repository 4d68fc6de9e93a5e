//! Unified leaf error kind for the orchestration core.
//!
//! Every other crate in the workspace defines its own `thiserror` enum and
//! wraps [`CoreError`] with `#[from]`, following the layered-error pattern
//! the teacher workspace uses between its protocol/transport/proxy crates.
//! The variant names here are the error-kind tokens surfaced verbatim on the
//! wire (spec.md §7): `{"code": "unknown_ci", ...}`.

use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    #[error("CI not found: {0}")]
    UnknownCi(String),

    #[error("name already registered: {0}")]
    NameTaken(String),

    #[error("system entry is protected from removal: {0}")]
    SystemEntryProtected(String),

    #[error("nothing staged for: {0}")]
    NothingStaged(String),

    #[error("port range exhausted")]
    PortExhausted,

    #[error("port {0} is not leased by {1}")]
    NotLeased(u16, String),

    #[error("no such queue: {0}")]
    NoSuchQueue(String),

    #[error("queue full for: {0}")]
    QueueFull(String),

    #[error("tool is already running: {0}")]
    AlreadyRunning(String),

    #[error("tool is not running: {0}")]
    NotRunning(String),

    #[error("launch failed for {name}: {reason}")]
    LaunchFailed { name: String, reason: String },

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("failed to persist state: {0}")]
    PersistFailed(String),

    #[error("invalid argument: {0}")]
    Invalid(String),
}

impl CoreError {
    /// The stable error-code token surfaced in HTTP error envelopes and CLI
    /// diagnostics (spec.md §6.2, §7).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCi(_) => "unknown_ci",
            Self::NameTaken(_) => "name_taken",
            Self::SystemEntryProtected(_) => "system_entry_protected",
            Self::NothingStaged(_) => "nothing_staged",
            Self::PortExhausted => "port_unavailable",
            Self::NotLeased(..) => "not_leased",
            Self::NoSuchQueue(_) => "no_such_queue",
            Self::QueueFull(_) => "queue_full",
            Self::AlreadyRunning(_) => "already_running",
            Self::NotRunning(_) => "not_running",
            Self::LaunchFailed { .. } => "launch_failed",
            Self::TransportFailure(_) => "transport_failure",
            Self::Timeout(_) => "timeout",
            Self::PersistFailed(_) => "persist_failed",
            Self::Invalid(_) => "invalid",
        }
    }

    /// The HTTP status the MCP server maps this error kind to (spec.md §6.2).
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownCi(_) | Self::NotRunning(_) => 404,
            Self::NameTaken(_) | Self::AlreadyRunning(_) | Self::SystemEntryProtected(_) => 409,
            Self::Invalid(_) | Self::NothingStaged(_) => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_ci_maps_to_404_and_stable_code() {
        let err = CoreError::UnknownCi("no-such-ci".into());
        assert_eq!(err.code(), "unknown_ci");
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.to_string(), "CI not found: no-such-ci");
    }

    #[test]
    fn name_taken_maps_to_409() {
        let err = CoreError::NameTaken("echo-ci".into());
        assert_eq!(err.code(), "name_taken");
        assert_eq!(err.http_status(), 409);
    }
}

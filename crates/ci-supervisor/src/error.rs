//! Supervisor-specific error kind, layered over [`ci_core::CoreError`].

use thiserror::Error;

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SupervisorError {
    #[error(transparent)]
    Core(#[from] ci_core::CoreError),

    #[error(transparent)]
    Bridge(#[from] ci_bridge::BridgeError),

    #[error("no such tool definition: {0}")]
    NotFound(String),

    #[error("invalid tool definition: {0}")]
    Invalid(String),

    #[error("executable not found or not executable: {0}")]
    ExecutableUnavailable(String),

    #[error("health check failed for {name}: {reason}")]
    HealthCheckFailed { name: String, reason: String },
}

impl SupervisorError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.code(),
            Self::Bridge(e) => e.code(),
            Self::NotFound(_) => "not_found",
            Self::Invalid(_) => "invalid",
            Self::ExecutableUnavailable(_) => "not_found",
            Self::HealthCheckFailed { .. } => "health_check_failed",
        }
    }
}

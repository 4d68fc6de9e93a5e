//! Health Monitor-specific error kind, layered over [`ci_core::CoreError`].

use thiserror::Error;

pub type HealthResult<T> = std::result::Result<T, HealthError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HealthError {
    #[error(transparent)]
    Core(#[from] ci_core::CoreError),

    #[error(transparent)]
    Router(#[from] ci_router::RouterError),

    #[error(transparent)]
    Supervisor(#[from] ci_supervisor::SupervisorError),
}

impl HealthError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.code(),
            Self::Router(e) => e.code(),
            Self::Supervisor(e) => e.code(),
        }
    }
}

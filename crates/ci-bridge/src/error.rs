//! Bridge-specific error kind, layered over [`ci_core::CoreError`].

use thiserror::Error;

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error(transparent)]
    Core(#[from] ci_core::CoreError),

    #[error("failed to spawn child process: {0}")]
    SpawnFailed(std::io::Error),

    #[error("I/O error talking to child: {0}")]
    Io(#[from] std::io::Error),

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("bridge is not running")]
    NotRunning,
}

impl BridgeError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.code(),
            Self::SpawnFailed(_) => "spawn_failed",
            Self::Io(_) => "transport_failure",
            Self::Pty(_) => "spawn_failed",
            Self::NotRunning => "not_running",
        }
    }
}

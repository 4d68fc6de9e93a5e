//! `aish`'s error kind and the exit-code mapping spec.md §6.1 prescribes.

use thiserror::Error;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("CI not found: {0}")]
    UnknownCi(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("registry inconsistency: {0}")]
    RegistryInconsistent(String),
}

impl CliError {
    /// Exit codes per spec.md §6.1: `0` success; `1` usage error; `2`
    /// unknown CI; `3` transport failure; `4` timeout; `5` registry
    /// inconsistency.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 1,
            Self::UnknownCi(_) => 2,
            Self::Transport(_) => 3,
            Self::Timeout => 4,
            Self::RegistryInconsistent(_) => 5,
        }
    }
}

impl From<reqwest::Error> for CliError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Classify a server error envelope (`{"detail", "code"}`) into the CLI's
/// own error kind so exit codes stay meaningful even when the failure
/// surfaced over HTTP rather than locally.
#[must_use]
pub fn from_envelope(code: &str, detail: &str) -> CliError {
    match code {
        "unknown_ci" => CliError::UnknownCi(detail.to_string()),
        "timeout" => CliError::Timeout,
        "transport_failure" => CliError::Transport(detail.to_string()),
        "persist_failed" => CliError::RegistryInconsistent(detail.to_string()),
        _ => CliError::Transport(detail.to_string()),
    }
}

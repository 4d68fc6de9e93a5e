//! Router-specific error kind, layered over [`ci_core::CoreError`].

use thiserror::Error;

pub type RouterResult<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RouterError {
    #[error(transparent)]
    Core(#[from] ci_core::CoreError),

    #[error("I/O error talking to transport: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no forward registered for: {0}")]
    NoSuchForward(String),

    #[error("transport returned no usable response")]
    EmptyResponse,
}

impl RouterError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.code(),
            Self::Io(_) | Self::Http(_) => "transport_failure",
            Self::Codec(_) => "invalid",
            Self::NoSuchForward(_) => "no_such_forward",
            Self::EmptyResponse => "transport_failure",
        }
    }
}

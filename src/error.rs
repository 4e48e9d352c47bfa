//! Crate-level error type.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::model::DocumentError;
use crate::session::SessionError;
use crate::wire::WireError;

/// Any error raised by the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected document edit
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Malformed backend item
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Backend request failure
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Session state does not allow the operation
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Configuration file problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Local file I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing output
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// How an error is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A request failed; the user may re-trigger it.
    NetworkFailure,
    /// Processing did not finish within the polling budget.
    Timeout,
    /// Waiting was cancelled by the user.
    Cancelled,
    /// An edit was rejected before touching the document.
    InvalidRange,
    /// The backend had nothing for the requested item.
    MissingData,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Document(_) | Error::Session(SessionError::Document(_)) => ErrorKind::InvalidRange,
            Error::Wire(WireError::Document(_)) => ErrorKind::InvalidRange,
            Error::Api(ApiError::Timeout { .. }) => ErrorKind::Timeout,
            Error::Api(ApiError::Cancelled) => ErrorKind::Cancelled,
            Error::Api(e) if e.is_not_found() => ErrorKind::MissingData,
            Error::Api(e) if e.is_network() => ErrorKind::NetworkFailure,
            _ => ErrorKind::Other,
        }
    }
}

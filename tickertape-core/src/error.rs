//! Top-level error type for API calls.
//!
//! Polling and command entry points never return these; they fold them into
//! a snapshot's `error` flag or a `false` result and log the detail. The
//! `try_*` variants on [`SpotifyClient`](crate::SpotifyClient) expose them.

use thiserror::Error;

use crate::filter::DecodeError;
use crate::http::RequestError;

/// Failure of a single API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The transport could not connect or send.
    #[error("connection failure: {0}")]
    ConnectionFailure(#[source] RequestError),

    /// The status line or header terminator was not found.
    #[error("protocol failure: {message}")]
    ProtocolFailure {
        status: Option<u16>,
        message: String,
    },

    /// The server answered with an unexpected status.
    #[error("unexpected HTTP status {status}")]
    HttpError { status: u16 },

    /// The body was malformed, truncated or over capacity.
    #[error("decode failure: {source}")]
    DecodeFailure {
        status: u16,
        #[source]
        source: DecodeError,
    },
}

impl ApiError {
    /// HTTP status of the failed call, when one was read.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::ConnectionFailure(_) => None,
            ApiError::ProtocolFailure { status, .. } => *status,
            ApiError::HttpError { status } => Some(*status),
            ApiError::DecodeFailure { status, .. } => Some(*status),
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::MissingStatusLine => ApiError::ProtocolFailure {
                status: None,
                message: e.to_string(),
            },
            other => ApiError::ConnectionFailure(other),
        }
    }
}

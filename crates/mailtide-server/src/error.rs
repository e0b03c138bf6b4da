//! Server-side error taxonomy.

use mailtide_proto::{DecodeError, StatusResponse};
use thiserror::Error;

/// Errors surfaced by handlers and the connection loop.
///
/// Protocol-level failures are [`StatusResponse`] values and translate
/// verbatim into tagged `NO`/`BAD`/`BYE` responses; I/O and parse errors
/// are transport-level and either become a `BAD` (parse) or terminate the
/// connection (I/O).
#[derive(Debug, Error)]
pub enum ServerError {
    /// Transport failure; the connection is torn down.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire grammar violation while reading from the peer.
    #[error("parse error: {0}")]
    Decode(#[from] DecodeError),

    /// Protocol-level command failure, sent verbatim to the peer.
    #[error(transparent)]
    Status(#[from] StatusResponse),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    Closed,
}

impl ServerError {
    /// Shorthand for a `NO` status error.
    #[must_use]
    pub fn no(text: impl Into<String>) -> Self {
        Self::Status(StatusResponse::no(text))
    }

    /// Shorthand for a `BAD` status error.
    #[must_use]
    pub fn bad(text: impl Into<String>) -> Self {
        Self::Status(StatusResponse::bad(text))
    }

    /// Shorthand for a `BYE` status error.
    #[must_use]
    pub fn bye(text: impl Into<String>) -> Self {
        Self::Status(StatusResponse::bye(text))
    }
}

/// Result alias for handler and connection operations.
pub type ServerResult<T> = Result<T, ServerError>;

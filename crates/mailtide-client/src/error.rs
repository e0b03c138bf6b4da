//! Client-side error taxonomy.

use std::sync::Arc;

use thiserror::Error;

use mailtide_proto::{DecodeError, StatusResponse};

/// Errors surfaced by client operations.
///
/// The type is cheap to clone: a single disconnect cause fans out to every
/// in-flight command and continuation waiter.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The server sent bytes that do not parse.
    #[error("protocol parse error: {0}")]
    Decode(#[from] DecodeError),

    /// The server completed the command with NO or BAD.
    #[error("server responded {0}")]
    Status(StatusResponse),

    /// The server announced shutdown.
    #[error("server said {0}")]
    Bye(StatusResponse),

    /// The connection ended; carries the stored disconnect cause.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The connection was closed locally.
    #[error("connection closed")]
    Closed,
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl ClientError {
    /// Wraps this error as the sticky disconnect cause.
    #[must_use]
    pub fn into_disconnect(self) -> Self {
        match self {
            Self::Disconnected(_) | Self::Closed => self,
            other => Self::Disconnected(other.to_string()),
        }
    }
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

//! Network error types

use std::io;
use std::time::Duration;

use crate::protocol::{ApiError, ErrorKind};

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request rejected: {0}")]
    Api(ApiError),
}

impl Error {
    /// Rejection category, if the server answered with an error
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Api(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Failures worth retrying on the next poll: lost connections, timeouts,
    /// and server-side faults
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionClosed | Error::Timeout(_) => true,
            Error::Api(e) => e.kind == ErrorKind::Internal,
            Error::Protocol(_) => false,
        }
    }
}

impl From<tasbih_core::Error> for Error {
    fn from(err: tasbih_core::Error) -> Self {
        Error::Api(ApiError::from(&err))
    }
}

//! Network protocol message types
//!
//! Every request frame is answered by exactly one response frame carrying the
//! same `request_id` and an HTTP-style status code. All messages are
//! JSON-serialized and length-prefixed on the wire.

use serde::{Deserialize, Serialize};
use tasbih_core::{Counter, IncrementOutcome};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_FORBIDDEN: u16 = 403;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_INTERNAL: u16 = 500;

/// Client requests. Counter ids travel as strings so a malformed code is a
/// 404 from the server rather than a framing error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// `POST /tasbih/create`
    Create { goal: i64, created_by: String },

    /// `GET /tasbih/{id}`
    Get { id: String },

    /// `POST /tasbih/{id}/join`
    Join { id: String, participant_name: String },

    /// `POST /tasbih/{id}/increment`
    Increment { id: String, participant_name: String },

    /// `POST /tasbih/{id}/reset`
    Reset { id: String, requesting_name: String },
}

impl Request {
    /// HTTP-shaped route, used for logging
    pub fn route(&self) -> String {
        match self {
            Request::Create { .. } => "POST /tasbih/create".to_string(),
            Request::Get { id } => format!("GET /tasbih/{}", id),
            Request::Join { id, .. } => format!("POST /tasbih/{}/join", id),
            Request::Increment { id, .. } => format!("POST /tasbih/{}/increment", id),
            Request::Reset { id, .. } => format!("POST /tasbih/{}/reset", id),
        }
    }
}

/// Rejection categories, stable on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidGoal,
    InvalidName,
    NotFound,
    Forbidden,
    AlreadyCompleted,
    Internal,
}

impl ErrorKind {
    /// Status code carried alongside this kind
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::InvalidGoal | ErrorKind::InvalidName => STATUS_BAD_REQUEST,
            ErrorKind::NotFound => STATUS_NOT_FOUND,
            ErrorKind::Forbidden => STATUS_FORBIDDEN,
            ErrorKind::AlreadyCompleted => STATUS_CONFLICT,
            ErrorKind::Internal => STATUS_INTERNAL,
        }
    }
}

/// Error body returned with any non-200 status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub status: u16,
    pub kind: ErrorKind,
    pub detail: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            status: kind.status(),
            kind,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}): {}", self.status, self.kind, self.detail)
    }
}

impl From<&tasbih_core::Error> for ApiError {
    fn from(err: &tasbih_core::Error) -> Self {
        use tasbih_core::Error as E;

        let kind = match err {
            E::InvalidGoal(_) => ErrorKind::InvalidGoal,
            E::InvalidName(_) => ErrorKind::InvalidName,
            E::NotFound(_) | E::InvalidId(_) => ErrorKind::NotFound,
            E::Forbidden(_) => ErrorKind::Forbidden,
            E::AlreadyCompleted(_) => ErrorKind::AlreadyCompleted,
            E::Database(_) | E::Io(_) | E::Serialization(_) => ErrorKind::Internal,
        };
        // Storage internals stay on the server
        let detail = match kind {
            ErrorKind::Internal => "internal server error".to_string(),
            _ => err.to_string(),
        };
        ApiError::new(kind, detail)
    }
}

/// Response payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Full counter snapshot
    Snapshot { counter: Counter },

    /// Post-increment snapshot plus the completion transition flag
    Incremented {
        counter: Counter,
        transitioned_now: bool,
    },

    /// Request rejected
    Error(ApiError),
}

impl Response {
    pub fn status(&self) -> u16 {
        match self {
            Response::Error(e) => e.status,
            _ => STATUS_OK,
        }
    }
}

impl From<IncrementOutcome> for Response {
    fn from(outcome: IncrementOutcome) -> Self {
        Response::Incremented {
            counter: outcome.counter,
            transitioned_now: outcome.transitioned_now,
        }
    }
}

/// Request frame on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub request_id: u64,
    #[serde(flatten)]
    pub request: Request,
}

/// Response frame on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub request_id: u64,
    pub status: u16,
    pub body: Response,
}

impl ResponseFrame {
    pub fn new(request_id: u64, body: Response) -> Self {
        Self {
            request_id,
            status: body.status(),
            body,
        }
    }
}

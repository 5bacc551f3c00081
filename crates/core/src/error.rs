//! Error types for Tasbih Core

use thiserror::Error;

use crate::models::CounterId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid goal: {0} (must be a positive integer)")]
    InvalidGoal(i64),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid counter id: {0}")]
    InvalidId(String),

    #[error("Counter not found: {0}")]
    NotFound(CounterId),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Counter {0} has already reached its goal")]
    AlreadyCompleted(CounterId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that mean "this counter id does not resolve"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidId(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

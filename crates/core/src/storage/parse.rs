//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Error as SqlError;
use uuid::Uuid;

use crate::models::CounterId;

/// Parse a counter id from a database string column
pub fn parse_counter_id(s: &str) -> Result<CounterId, SqlError> {
    Uuid::parse_str(s)
        .map(CounterId)
        .map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Read a non-negative integer column into a u64
pub fn parse_count(value: i64) -> Result<u64, SqlError> {
    u64::try_from(value).map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Integer, Box::new(e)))
}

/// Convert a count to its stored representation
pub fn count_to_sql(value: u64) -> Result<i64, SqlError> {
    i64::try_from(value).map_err(|e| SqlError::ToSqlConversionFailure(Box::new(e)))
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

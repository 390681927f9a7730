//! Error types for blockfacts

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The requested row does not exist. Ledger and tracker treat this as
    /// the signal to create the row.
    #[error("Row not found")]
    NotFound,
    /// A unique key clashed on insert, usually because a concurrent caller
    /// created the same row first.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("{field} value {value} overflows SQLite INTEGER")]
    ValueOverflow { field: &'static str, value: u64 },
    #[error("Timestamp {0} is outside the representable calendar range")]
    InvalidTimestamp(u64),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::NotFound,
            rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
                LedgerError::ConstraintViolation(msg.unwrap_or_else(|| e.to_string()))
            }
            other => LedgerError::Database(other),
        }
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound)
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, LedgerError::ConstraintViolation(_))
    }
}

/// Turns a store lookup into `Found | Absent`: `NotFound` becomes `Ok(None)`,
/// every other error passes through untouched.
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(LedgerError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;

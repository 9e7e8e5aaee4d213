//! Error taxonomy shared by the ordering engine and the board operations.

use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, BoardError>;

/// Errors surfaced by board operations.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Concurrent modification detected, gave up after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    #[error("Store failure: {0}")]
    Store(#[from] rusqlite::Error),
}

impl BoardError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether re-running the whole transaction may succeed.
    ///
    /// Busy/locked stores and `(scope, position)` uniqueness violations are
    /// the signatures of an interleaved writer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
            _ => false,
        }
    }
}

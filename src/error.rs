//! Ledger Error Types
//!
//! One error taxonomy shared by the stores, the transfer coordinator and the
//! service facade. The gateway maps it to HTTP status codes.

use std::time::Duration;

use thiserror::Error;

use crate::core_types::{AccountId, Amount};

/// PostgreSQL SQLSTATE: could not serialize access due to concurrent update
const PG_SERIALIZATION_FAILURE: &str = "40001";
/// PostgreSQL SQLSTATE: deadlock detected
const PG_DEADLOCK_DETECTED: &str = "40P01";
/// PostgreSQL SQLSTATE: lock not available (lock_timeout / NOWAIT)
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";
/// PostgreSQL SQLSTATE: foreign key violation
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
/// PostgreSQL SQLSTATE: check constraint violation
const PG_CHECK_VIOLATION: &str = "23514";

/// Ledger error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed input: empty owner, unsupported currency, bad amount,
    /// self-transfer, out-of-range pagination.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds in account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Amount,
        requested: Amount,
    },

    /// Transient transaction conflict. Retried by the coordinator.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Deadline of {0:?} elapsed")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Only transient conflicts are worth another attempt.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }

    /// Stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidArgument(_) => "INVALID_ARGUMENT",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::Timeout(_) => "TIMEOUT",
            LedgerError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidArgument(_) => 400,
            LedgerError::NotFound(_) => 404,
            LedgerError::Conflict(_) => 409,
            LedgerError::InsufficientFunds { .. } => 422,
            LedgerError::Timeout(_) => 504,
            LedgerError::Internal(_) => 500,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(PG_SERIALIZATION_FAILURE) | Some(PG_DEADLOCK_DETECTED)
                | Some(PG_LOCK_NOT_AVAILABLE) => LedgerError::Conflict(db_err.message().to_string()),
                Some(PG_FOREIGN_KEY_VIOLATION) => {
                    LedgerError::NotFound("referenced account does not exist".to_string())
                }
                Some(PG_CHECK_VIOLATION) => LedgerError::InvalidArgument(db_err.message().to_string()),
                _ => LedgerError::Internal(e.to_string()),
            },
            _ => LedgerError::Internal(e.to_string()),
        }
    }
}

/// Ledger result type
pub type Result<T> = std::result::Result<T, LedgerError>;

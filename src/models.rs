//! Ledger data model: accounts, entries, transfers
//!
//! Entries and transfers are write-once audit records. Account balances are
//! only changed inside a unit of work that also writes the matching entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, Amount, EntryId, TransferId};
use crate::error::LedgerError;

// ============================================================================
// Currency
// ============================================================================

/// Supported account currencies (ISO 4217 codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    /// Exact match only: codes are stored and compared in upper case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            other => Err(LedgerError::invalid(format!(
                "unsupported currency '{}' (expected one of USD, EUR)",
                other
            ))),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Account row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub currency: Currency,
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
}

/// Signed posting against one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    /// Negative = debit, positive = credit
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Money movement between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Always > 0
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Pagination
// ============================================================================

pub const MIN_PAGE_SIZE: i64 = 5;
pub const MAX_PAGE_SIZE: i64 = 10;

/// Validated page window, `page_id` is 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page_id: i64,
    page_size: i64,
}

impl PageRequest {
    /// # Errors
    /// `InvalidArgument` unless `page_id >= 1` and `5 <= page_size <= 10`
    pub fn new(page_id: i64, page_size: i64) -> Result<Self, LedgerError> {
        if page_id < 1 {
            return Err(LedgerError::invalid(format!(
                "page_id must be >= 1, got {}",
                page_id
            )));
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(LedgerError::invalid(format!(
                "page_size must be between {} and {}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, page_size
            )));
        }
        Ok(Self { page_id, page_size })
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page_id - 1) * self.page_size
    }
}

//! Transfer request/response types and the retry policy

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::TransferConfig;
use crate::core_types::{AccountId, Amount};
use crate::models::{Account, Entry, Transfer};

/// Transfer request from the service layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Minor units, must be > 0
    pub amount: Amount,
}

impl TransferRequest {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: Amount) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Account ids in lock acquisition order (ascending)
    #[inline]
    pub fn lock_order(&self) -> (AccountId, AccountId) {
        if self.from_account_id <= self.to_account_id {
            (self.from_account_id, self.to_account_id)
        } else {
            (self.to_account_id, self.from_account_id)
        }
    }
}

/// Committed transfer with both postings and post-transfer account states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    pub from_account: Account,
    pub to_account: Account,
}

/// Committed deposit: the credit entry and the account after it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositResult {
    pub entry: Entry,
    pub account: Account,
}

/// Conflict retry and deadline policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Bounds locking, mutation and backoff; a started commit is always awaited
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_min: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
            timeout: Duration::from_secs(5),
        }
    }
}

impl From<&TransferConfig> for RetryPolicy {
    fn from(cfg: &TransferConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff_min: Duration::from_millis(cfg.backoff_min_ms),
            backoff_max: Duration::from_millis(cfg.backoff_max_ms.max(cfg.backoff_min_ms)),
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }
}

impl RetryPolicy {
    /// Random sleep in `[backoff_min, backoff_max]`
    pub fn backoff(&self) -> Duration {
        let min = self.backoff_min.as_millis() as u64;
        let max = (self.backoff_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

//! Ledger storage port
//!
//! Two traits split the storage surface:
//!
//! - [`LedgerStore`] is the pool-level handle: single-statement reads plus
//!   account creation, and `begin()` to open a unit of work.
//! - [`LedgerTx`] is one atomic unit of work. It is the only handle through
//!   which account balances, entries and transfers are written together.
//!
//! Adapters:
//! - [`PgLedgerStore`] - PostgreSQL (`SELECT ... FOR UPDATE` row locks)
//! - [`MemoryLedgerStore`] - in-process engine with per-row exclusive locks

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;

use crate::core_types::{AccountId, Amount, EntryId, TransferId};
use crate::error::Result;
use crate::models::{Account, Currency, Entry, PageRequest, Transfer};

/// Pool-level storage handle, shared across tasks
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    /// Open a new unit of work
    async fn begin(&self) -> Result<Box<dyn LedgerTx>>;

    /// Insert an account with zero balance
    async fn create_account(&self, owner: &str, currency: Currency) -> Result<Account>;

    async fn get_account(&self, id: AccountId) -> Result<Account>;

    /// Accounts ordered by id ascending
    async fn list_accounts(&self, page: PageRequest) -> Result<Vec<Account>>;

    async fn get_entry(&self, id: EntryId) -> Result<Entry>;

    /// Entries ordered by id ascending, optionally restricted to one account
    async fn list_entries(
        &self,
        account_id: Option<AccountId>,
        page: PageRequest,
    ) -> Result<Vec<Entry>>;

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer>;

    /// Transfers ordered by id ascending. The account filter matches either side.
    async fn list_transfers(
        &self,
        account_id: Option<AccountId>,
        page: PageRequest,
    ) -> Result<Vec<Transfer>>;

    async fn health_check(&self) -> Result<()>;
}

/// One atomic unit of work
///
/// Dropping an uncommitted unit rolls it back: staged writes are discarded
/// and every row lock it holds is released.
#[async_trait]
pub trait LedgerTx: Send {
    /// Take the exclusive row lock on an account and return its current state.
    ///
    /// Blocks until competing units holding the lock finish. Re-locking an
    /// account already held by this unit returns immediately.
    async fn lock_account(&mut self, id: AccountId) -> Result<Account>;

    /// Add `delta` to the account balance, locking the row first if needed.
    ///
    /// # Errors
    /// - `InsufficientFunds` if `delta < 0` and the balance would go negative
    /// - `InvalidArgument` on overflow
    /// - `NotFound` if the account does not exist
    async fn adjust_balance(&mut self, id: AccountId, delta: Amount) -> Result<Account>;

    async fn append_entry(&mut self, account_id: AccountId, amount: Amount) -> Result<Entry>;

    async fn append_transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transfer>;

    /// Publish every staged write atomically and release the row locks
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every staged write and release the row locks
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// New balance after applying `delta`, shared by both adapters
pub(crate) fn checked_balance(account: &Account, delta: Amount) -> Result<Amount> {
    let next = account.balance.checked_add(delta).ok_or_else(|| {
        crate::error::LedgerError::invalid(format!(
            "balance overflow on account {} (balance {}, delta {})",
            account.id, account.balance, delta
        ))
    })?;
    if delta < 0 && next < 0 {
        return Err(crate::error::LedgerError::InsufficientFunds {
            account_id: account.id,
            balance: account.balance,
            requested: delta.saturating_neg(),
        });
    }
    Ok(next)
}

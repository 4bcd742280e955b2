//! In-process ledger engine
//!
//! Mirrors the locking behaviour of the PostgreSQL adapter closely enough
//! that the transfer coordinator cannot tell them apart:
//!
//! - every account has its own exclusive row lock (a tokio mutex), held by a
//!   unit of work from `lock_account` until commit or rollback
//! - writes are staged inside the unit and published under one table lock at
//!   commit, so readers never observe half a transfer
//! - ids come from sequences at append time; a rolled back unit leaves gaps
//!
//! Two knobs exist for exercising the coordinator's recovery paths:
//! [`MemoryLedgerStore::with_lock_timeout`] turns a lock wait into a
//! `Conflict`, and [`MemoryLedgerStore::inject_commit_conflicts`] makes the
//! next N commits fail with a serialization-style `Conflict`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::{LedgerStore, LedgerTx, checked_balance};
use crate::core_types::{AccountId, Amount, EntryId, TransferId};
use crate::error::{LedgerError, Result};
use crate::models::{Account, Currency, Entry, PageRequest, Transfer};

/// Committed state
#[derive(Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
}

struct Inner {
    tables: RwLock<Tables>,
    row_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
    lock_timeout: Option<Duration>,
    injected_conflicts: AtomicU32,
}

impl Inner {
    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        let tables = self
            .tables
            .read()
            .map_err(|_| LedgerError::internal("ledger tables lock poisoned"))?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| LedgerError::internal("ledger tables lock poisoned"))?;
        Ok(f(&mut tables))
    }

    /// Consume one injected conflict, if any are pending
    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory [`LedgerStore`]
#[derive(Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Row lock waits longer than `timeout` fail with `Conflict`
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self::build(Some(timeout))
    }

    fn build(lock_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                row_locks: DashMap::new(),
                account_seq: AtomicI64::new(0),
                entry_seq: AtomicI64::new(0),
                transfer_seq: AtomicI64::new(0),
                lock_timeout,
                injected_conflicts: AtomicU32::new(0),
            }),
        }
    }

    /// Make the next `n` commits fail with a retryable `Conflict`
    pub fn inject_commit_conflicts(&self, n: u32) {
        self.inner.injected_conflicts.store(n, Ordering::SeqCst);
    }

    /// Row counts `(accounts, entries, transfers)`
    pub fn row_counts(&self) -> Result<(usize, usize, usize)> {
        self.inner.read(|t| {
            (
                t.accounts.len(),
                t.entries.len(),
                t.transfers.len(),
            )
        })
    }

    /// Sum of entry amounts per account, for conservation checks
    pub fn entry_sums(&self) -> Result<HashMap<AccountId, Amount>> {
        self.inner.read(|t| {
            let mut sums = HashMap::new();
            for entry in t.entries.values() {
                *sums.entry(entry.account_id).or_insert(0) += entry.amount;
            }
            sums
        })
    }
}

fn window<'a, T: Clone + 'a>(
    rows: impl Iterator<Item = &'a T>,
    page: PageRequest,
) -> Vec<T> {
    rows.skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        Ok(Box::new(MemoryTx {
            store: self.inner.clone(),
            held: HashMap::new(),
            staged_accounts: BTreeMap::new(),
            staged_entries: Vec::new(),
            staged_transfers: Vec::new(),
        }))
    }

    async fn create_account(&self, owner: &str, currency: Currency) -> Result<Account> {
        let id = self.inner.account_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let account = Account {
            id,
            owner: owner.to_string(),
            currency,
            balance: 0,
            created_at: Utc::now(),
        };
        self.inner.row_locks.insert(id, Arc::new(Mutex::new(())));
        self.inner.write(|t| {
            t.accounts.insert(id, account.clone());
        })?;
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        self.inner
            .read(|t| t.accounts.get(&id).cloned())?
            .ok_or_else(|| LedgerError::not_found(format!("account {} not found", id)))
    }

    async fn list_accounts(&self, page: PageRequest) -> Result<Vec<Account>> {
        self.inner.read(|t| window(t.accounts.values(), page))
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry> {
        self.inner
            .read(|t| t.entries.get(&id).cloned())?
            .ok_or_else(|| LedgerError::not_found(format!("entry {} not found", id)))
    }

    async fn list_entries(
        &self,
        account_id: Option<AccountId>,
        page: PageRequest,
    ) -> Result<Vec<Entry>> {
        self.inner.read(|t| {
            window(
                t.entries
                    .values()
                    .filter(|e| account_id.is_none_or(|id| e.account_id == id)),
                page,
            )
        })
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer> {
        self.inner
            .read(|t| t.transfers.get(&id).cloned())?
            .ok_or_else(|| LedgerError::not_found(format!("transfer {} not found", id)))
    }

    async fn list_transfers(
        &self,
        account_id: Option<AccountId>,
        page: PageRequest,
    ) -> Result<Vec<Transfer>> {
        self.inner.read(|t| {
            window(
                t.transfers.values().filter(|tr| {
                    account_id.is_none_or(|id| tr.from_account_id == id || tr.to_account_id == id)
                }),
                page,
            )
        })
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.read(|_| ())
    }
}

// ============================================================================
// Unit of work
// ============================================================================

struct MemoryTx {
    store: Arc<Inner>,
    /// Row locks held by this unit, released on drop
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    /// Locked accounts with staged balances
    staged_accounts: BTreeMap<AccountId, Account>,
    staged_entries: Vec<Entry>,
    staged_transfers: Vec<Transfer>,
}

impl MemoryTx {
    fn account_exists(&self, id: AccountId) -> Result<bool> {
        if self.staged_accounts.contains_key(&id) {
            return Ok(true);
        }
        self.store.read(|t| t.accounts.contains_key(&id))
    }

    fn staged(&mut self, id: AccountId) -> Result<&mut Account> {
        self.staged_accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::internal(format!("account {} is not locked", id)))
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Account> {
        if let Some(account) = self.staged_accounts.get(&id) {
            return Ok(account.clone());
        }

        let row_lock = self
            .store
            .row_locks
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LedgerError::not_found(format!("account {} not found", id)))?;

        let guard = match self.store.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, row_lock.lock_owned())
                .await
                .map_err(|_| {
                    LedgerError::conflict(format!("lock wait timeout on account {}", id))
                })?,
            None => row_lock.lock_owned().await,
        };

        let account = self
            .store
            .read(|t| t.accounts.get(&id).cloned())?
            .ok_or_else(|| LedgerError::not_found(format!("account {} not found", id)))?;

        debug!(account_id = id, "row lock acquired");
        self.held.insert(id, guard);
        self.staged_accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn adjust_balance(&mut self, id: AccountId, delta: Amount) -> Result<Account> {
        if !self.held.contains_key(&id) {
            self.lock_account(id).await?;
        }
        let account = self.staged(id)?;
        account.balance = checked_balance(account, delta)?;
        Ok(account.clone())
    }

    async fn append_entry(&mut self, account_id: AccountId, amount: Amount) -> Result<Entry> {
        if !self.account_exists(account_id)? {
            return Err(LedgerError::not_found(format!(
                "account {} not found",
                account_id
            )));
        }
        let entry = Entry {
            id: self.store.entry_seq.fetch_add(1, Ordering::SeqCst) + 1,
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.staged_entries.push(entry.clone());
        Ok(entry)
    }

    async fn append_transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transfer> {
        if amount <= 0 {
            return Err(LedgerError::invalid(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }
        for id in [from, to] {
            if !self.account_exists(id)? {
                return Err(LedgerError::not_found(format!("account {} not found", id)));
            }
        }
        let transfer = Transfer {
            id: self.store.transfer_seq.fetch_add(1, Ordering::SeqCst) + 1,
            from_account_id: from,
            to_account_id: to,
            amount,
            created_at: Utc::now(),
        };
        self.staged_transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.store.take_injected_conflict() {
            debug!("injected commit conflict");
            return Err(LedgerError::conflict(
                "could not serialize access due to concurrent update",
            ));
        }

        let MemoryTx {
            store,
            held,
            staged_accounts,
            staged_entries,
            staged_transfers,
        } = *self;

        store.write(|t| {
            for (id, account) in staged_accounts {
                if let Some(row) = t.accounts.get_mut(&id) {
                    row.balance = account.balance;
                }
            }
            for entry in staged_entries {
                t.entries.insert(entry.id, entry);
            }
            for transfer in staged_transfers {
                t.transfers.insert(transfer.id, transfer);
            }
        })?;

        // Release row locks only after the writes are visible
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!(
            locks = self.held.len(),
            staged_entries = self.staged_entries.len(),
            "unit of work rolled back"
        );
        Ok(())
    }
}

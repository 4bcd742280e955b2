//! PostgreSQL ledger adapter
//!
//! A unit of work is one `sqlx` transaction. Row locks are taken with
//! `SELECT ... FOR UPDATE` and held until commit or rollback; dropping the
//! `sqlx::Transaction` without committing rolls it back.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};

use super::{LedgerStore, LedgerTx, checked_balance};
use crate::core_types::{AccountId, Amount, EntryId, TransferId};
use crate::db::Database;
use crate::error::{LedgerError, Result};
use crate::models::{Account, Currency, Entry, PageRequest, Transfer};

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";

fn account_from_row(row: &PgRow) -> Result<Account> {
    let currency: String = row.try_get("currency")?;
    let currency = currency
        .parse::<Currency>()
        .map_err(|e| LedgerError::internal(format!("corrupt account row: {}", e)))?;
    Ok(Account {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        currency,
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<Entry> {
    Ok(Entry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer> {
    Ok(Transfer {
        id: row.try_get("id")?,
        from_account_id: row.try_get("from_account_id")?,
        to_account_id: row.try_get("to_account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

/// PostgreSQL [`LedgerStore`]
#[derive(Clone)]
pub struct PgLedgerStore {
    db: Database,
    lock_timeout: Option<Duration>,
}

impl PgLedgerStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            lock_timeout: None,
        }
    }

    /// Set `lock_timeout` on every unit of work. Lock waits past it fail
    /// with SQLSTATE 55P03, which is classified as `Conflict`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let mut tx = self.db.pool().begin().await?;
        if let Some(limit) = self.lock_timeout {
            // SET does not accept bind parameters
            let stmt = format!("SET LOCAL lock_timeout = '{}ms'", limit.as_millis());
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }
        Ok(Box::new(PgTx {
            tx,
            locked: HashSet::new(),
        }))
    }

    async fn create_account(&self, owner: &str, currency: Currency) -> Result<Account> {
        let sql = format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, 0, $2) RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(owner)
            .bind(currency.as_str())
            .fetch_one(self.db.pool())
            .await?;
        account_from_row(&row)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("account {} not found", id)))?;
        account_from_row(&row)
    }

    async fn list_accounts(&self, page: PageRequest) -> Result<Vec<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts ORDER BY id LIMIT $1 OFFSET $2",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry> {
        let sql = format!("SELECT {} FROM entries WHERE id = $1", ENTRY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("entry {} not found", id)))?;
        entry_from_row(&row)
    }

    async fn list_entries(
        &self,
        account_id: Option<AccountId>,
        page: PageRequest,
    ) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {} FROM entries \
             WHERE ($1::BIGINT IS NULL OR account_id = $1) \
             ORDER BY id LIMIT $2 OFFSET $3",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(account_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer> {
        let sql = format!("SELECT {} FROM transfers WHERE id = $1", TRANSFER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("transfer {} not found", id)))?;
        transfer_from_row(&row)
    }

    async fn list_transfers(
        &self,
        account_id: Option<AccountId>,
        page: PageRequest,
    ) -> Result<Vec<Transfer>> {
        let sql = format!(
            "SELECT {} FROM transfers \
             WHERE ($1::BIGINT IS NULL OR from_account_id = $1 OR to_account_id = $1) \
             ORDER BY id LIMIT $2 OFFSET $3",
            TRANSFER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(account_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(transfer_from_row).collect()
    }

    async fn health_check(&self) -> Result<()> {
        self.db.health_check().await?;
        Ok(())
    }
}

// ============================================================================
// Unit of work
// ============================================================================

struct PgTx {
    tx: Transaction<'static, Postgres>,
    /// Accounts already locked FOR UPDATE by this transaction
    locked: HashSet<AccountId>,
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Account> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("account {} not found", id)))?;
        self.locked.insert(id);
        account_from_row(&row)
    }

    async fn adjust_balance(&mut self, id: AccountId, delta: Amount) -> Result<Account> {
        // The locking read doubles as the funds check; the row cannot change
        // underneath us until commit.
        let current = self.lock_account(id).await?;
        checked_balance(&current, delta)?;

        let sql = format!(
            "UPDATE accounts SET balance = balance + $2 WHERE id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(delta)
            .fetch_one(&mut *self.tx)
            .await?;
        account_from_row(&row)
    }

    async fn append_entry(&mut self, account_id: AccountId, amount: Amount) -> Result<Entry> {
        let sql = format!(
            "INSERT INTO entries (account_id, amount) VALUES ($1, $2) RETURNING {}",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(account_id)
            .bind(amount)
            .fetch_one(&mut *self.tx)
            .await?;
        entry_from_row(&row)
    }

    async fn append_transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transfer> {
        let sql = format!(
            "INSERT INTO transfers (from_account_id, to_account_id, amount) \
             VALUES ($1, $2, $3) RETURNING {}",
            TRANSFER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(from)
            .bind(to)
            .bind(amount)
            .fetch_one(&mut *self.tx)
            .await?;
        transfer_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        tracing::debug!(locks = self.locked.len(), "transaction rolled back");
        self.tx.rollback().await?;
        Ok(())
    }
}

//! Ledger service facade
//!
//! Entry point for the request-handling layer. Re-validates every argument
//! before it reaches the stores, so callers other than the HTTP gateway get
//! the same guarantees.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::AppConfig;
use crate::core_types::{AccountId, Amount, EntryId, TransferId};
use crate::error::{LedgerError, Result};
use crate::models::{Account, Currency, Entry, PageRequest, Transfer};
use crate::store::LedgerStore;
use crate::transfer::{
    DepositResult, RetryPolicy, TransferCoordinator, TransferRequest, TransferResult,
};

/// Request to open an account
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, message = "owner is required"))]
    pub owner: String,
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: String,
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    coordinator: TransferCoordinator,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        let coordinator = TransferCoordinator::new(store.clone(), policy);
        Self { store, coordinator }
    }

    pub fn from_config(store: Arc<dyn LedgerStore>, config: &AppConfig) -> Self {
        Self::new(store, RetryPolicy::from(&config.transfer))
    }

    /// Storage backend name, for health output and logs
    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub async fn create_account(&self, req: CreateAccountRequest) -> Result<Account> {
        let owner = req.owner.trim();
        if owner.is_empty() {
            return Err(LedgerError::invalid("owner must not be empty"));
        }
        let currency: Currency = req.currency.parse()?;

        let account = self.store.create_account(owner, currency).await?;
        tracing::info!(
            account_id = account.id,
            owner = %account.owner,
            currency = %account.currency,
            "Account created"
        );
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account> {
        check_id("account id", id)?;
        self.store.get_account(id).await
    }

    pub async fn list_accounts(&self, page_id: i64, page_size: i64) -> Result<Vec<Account>> {
        let page = PageRequest::new(page_id, page_size)?;
        self.store.list_accounts(page).await
    }

    // ========================================================================
    // Money movement
    // ========================================================================

    pub async fn transfer(&self, req: TransferRequest) -> Result<TransferResult> {
        check_id("from_account_id", req.from_account_id)?;
        check_id("to_account_id", req.to_account_id)?;
        self.coordinator.transfer(req).await
    }

    pub async fn deposit(&self, account_id: AccountId, amount: Amount) -> Result<DepositResult> {
        check_id("account id", account_id)?;
        self.coordinator.deposit(account_id, amount).await
    }

    // ========================================================================
    // Audit records
    // ========================================================================

    pub async fn get_entry(&self, id: EntryId) -> Result<Entry> {
        check_id("entry id", id)?;
        self.store.get_entry(id).await
    }

    pub async fn list_entries(
        &self,
        account_id: Option<AccountId>,
        page_id: i64,
        page_size: i64,
    ) -> Result<Vec<Entry>> {
        if let Some(id) = account_id {
            check_id("account_id", id)?;
        }
        let page = PageRequest::new(page_id, page_size)?;
        self.store.list_entries(account_id, page).await
    }

    pub async fn get_transfer(&self, id: TransferId) -> Result<Transfer> {
        check_id("transfer id", id)?;
        self.store.get_transfer(id).await
    }

    pub async fn list_transfers(
        &self,
        account_id: Option<AccountId>,
        page_id: i64,
        page_size: i64,
    ) -> Result<Vec<Transfer>> {
        if let Some(id) = account_id {
            check_id("account_id", id)?;
        }
        let page = PageRequest::new(page_id, page_size)?;
        self.store.list_transfers(account_id, page).await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }
}

fn check_id(what: &str, id: i64) -> Result<()> {
    if id < 1 {
        return Err(LedgerError::invalid(format!("{} must be >= 1, got {}", what, id)));
    }
    Ok(())
}

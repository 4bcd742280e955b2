//! Integration Tests for the Transfer Coordinator
//!
//! These run the full unit-of-work flow against the in-memory ledger, whose
//! row locks block for real, so lock ordering and deadline handling are
//! exercised without a live database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::core_types::{AccountId, Amount, EntryId, TransferId};
use crate::error::{LedgerError, Result};
use crate::models::{Account, Currency, Entry, PageRequest, Transfer};
use crate::store::{LedgerStore, LedgerTx, MemoryLedgerStore};
use crate::transfer::coordinator::TransferCoordinator;
use crate::transfer::types::{RetryPolicy, TransferRequest};

/// Helper to create a coordinator over a fresh in-memory ledger
struct TestHarness {
    store: MemoryLedgerStore,
    coordinator: Arc<TransferCoordinator>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_store(MemoryLedgerStore::new(), fast_policy())
    }

    fn with_store(store: MemoryLedgerStore, policy: RetryPolicy) -> Self {
        let coordinator = Arc::new(TransferCoordinator::new(Arc::new(store.clone()), policy));
        Self { store, coordinator }
    }

    async fn open(&self, owner: &str, currency: Currency, balance: Amount) -> Account {
        let account = self.store.create_account(owner, currency).await.unwrap();
        if balance > 0 {
            self.coordinator.deposit(account.id, balance).await.unwrap();
        }
        self.store.get_account(account.id).await.unwrap()
    }

    async fn balance(&self, id: AccountId) -> Amount {
        self.store.get_account(id).await.unwrap().balance
    }

    /// (entries, transfers) written so far
    fn rows(&self) -> (usize, usize) {
        let (_, entries, transfers) = self.store.row_counts().unwrap();
        (entries, transfers)
    }

    /// Every account balance equals the sum of its entries
    async fn assert_conserved(&self, ids: &[AccountId]) {
        let sums = self.store.entry_sums().unwrap();
        for id in ids {
            assert_eq!(
                self.balance(*id).await,
                sums.get(id).copied().unwrap_or(0),
                "balance/entry mismatch on account {}",
                id
            );
        }
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_min: Duration::from_millis(1),
        backoff_max: Duration::from_millis(3),
        timeout: Duration::from_secs(5),
    }
}

// ========================================================================
// Happy Path Tests
// ========================================================================

#[tokio::test]
async fn test_simple_transfer() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 100).await;
    let b = h.open("bob", Currency::Usd, 50).await;
    let (entries_before, _) = h.rows();

    let result = h
        .coordinator
        .transfer(TransferRequest::new(a.id, b.id, 30))
        .await
        .unwrap();

    assert_eq!(result.from_account.balance, 70);
    assert_eq!(result.to_account.balance, 80);
    assert_eq!(result.transfer.amount, 30);
    assert_eq!(result.transfer.from_account_id, a.id);
    assert_eq!(result.transfer.to_account_id, b.id);
    assert_eq!(result.from_entry.account_id, a.id);
    assert_eq!(result.from_entry.amount, -30);
    assert_eq!(result.to_entry.account_id, b.id);
    assert_eq!(result.to_entry.amount, 30);

    assert_eq!(h.balance(a.id).await, 70);
    assert_eq!(h.balance(b.id).await, 80);
    assert_eq!(h.rows(), (entries_before + 2, 1));

    let stored = h.store.get_transfer(result.transfer.id).await.unwrap();
    assert_eq!(stored, result.transfer);
    h.assert_conserved(&[a.id, b.id]).await;
}

#[tokio::test]
async fn test_transfer_from_higher_to_lower_id() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Eur, 10).await;
    let b = h.open("bob", Currency::Eur, 90).await;

    let result = h
        .coordinator
        .transfer(TransferRequest::new(b.id, a.id, 90))
        .await
        .unwrap();

    assert_eq!(result.from_account.id, b.id);
    assert_eq!(result.from_account.balance, 0);
    assert_eq!(result.to_account.balance, 100);
}

#[tokio::test]
async fn test_deposit_writes_one_entry() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 0).await;

    let result = h.coordinator.deposit(a.id, 250).await.unwrap();
    assert_eq!(result.account.balance, 250);
    assert_eq!(result.entry.amount, 250);
    assert_eq!(h.rows(), (1, 0));

    let err = h.coordinator.deposit(a.id, 0).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
    let err = h.coordinator.deposit(999, 5).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert_eq!(h.rows(), (1, 0));
}

// ========================================================================
// Failure Tests
// ========================================================================

#[tokio::test]
async fn test_insufficient_funds_writes_nothing() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 10).await;
    let b = h.open("bob", Currency::Usd, 0).await;
    let rows_before = h.rows();

    let err = h
        .coordinator
        .transfer(TransferRequest::new(a.id, b.id, 30))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LedgerError::InsufficientFunds {
            account_id: a.id,
            balance: 10,
            requested: 30
        }
    );
    assert_eq!(h.balance(a.id).await, 10);
    assert_eq!(h.balance(b.id).await, 0);
    assert_eq!(h.rows(), rows_before);
}

#[tokio::test]
async fn test_self_transfer_rejected() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 100).await;
    let rows_before = h.rows();

    let err = h
        .coordinator
        .transfer(TransferRequest::new(a.id, a.id, 10))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_ARGUMENT");
    assert_eq!(h.balance(a.id).await, 100);
    assert_eq!(h.rows(), rows_before);
}

#[tokio::test]
async fn test_non_positive_amount_rejected() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 100).await;
    let b = h.open("bob", Currency::Usd, 0).await;

    for amount in [0, -1] {
        let err = h
            .coordinator
            .transfer(TransferRequest::new(a.id, b.id, amount))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }
}

#[tokio::test]
async fn test_missing_account_not_found() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 100).await;
    let rows_before = h.rows();

    let err = h
        .coordinator
        .transfer(TransferRequest::new(a.id, 42, 10))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let err = h
        .coordinator
        .transfer(TransferRequest::new(42, a.id, 10))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    assert_eq!(h.balance(a.id).await, 100);
    assert_eq!(h.rows(), rows_before);
}

#[tokio::test]
async fn test_currency_mismatch_rejected() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 100).await;
    let b = h.open("bob", Currency::Eur, 0).await;

    let err = h
        .coordinator
        .transfer(TransferRequest::new(a.id, b.id, 10))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_ARGUMENT");
    assert_eq!(h.balance(a.id).await, 100);
    assert_eq!(h.rows().1, 0);
}

// ========================================================================
// Retry Tests
// ========================================================================

#[tokio::test]
async fn test_conflicts_below_budget_are_absorbed() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 100).await;
    let b = h.open("bob", Currency::Usd, 0).await;

    h.store.inject_commit_conflicts(2);
    let result = h
        .coordinator
        .transfer(TransferRequest::new(a.id, b.id, 40))
        .await
        .unwrap();

    assert_eq!(result.from_account.balance, 60);
    assert_eq!(h.balance(b.id).await, 40);
    assert_eq!(h.rows().1, 1);
    h.assert_conserved(&[a.id, b.id]).await;
}

#[tokio::test]
async fn test_conflicts_at_budget_surface_conflict() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 100).await;
    let b = h.open("bob", Currency::Usd, 0).await;
    let rows_before = h.rows();

    h.store.inject_commit_conflicts(3);
    let err = h
        .coordinator
        .transfer(TransferRequest::new(a.id, b.id, 40))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::Conflict(_)));
    assert_eq!(h.balance(a.id).await, 100);
    assert_eq!(h.balance(b.id).await, 0);
    assert_eq!(h.rows(), rows_before);
}

#[tokio::test]
async fn test_lock_wait_timeout_retried_then_exhausted() {
    let store = MemoryLedgerStore::with_lock_timeout(Duration::from_millis(10));
    let h = TestHarness::with_store(
        store,
        RetryPolicy {
            max_attempts: 2,
            ..fast_policy()
        },
    );
    let a = h.open("alice", Currency::Usd, 100).await;
    let b = h.open("bob", Currency::Usd, 0).await;

    let mut holder = h.store.begin().await.unwrap();
    holder.lock_account(b.id).await.unwrap();

    let err = h
        .coordinator
        .transfer(TransferRequest::new(a.id, b.id, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)));

    holder.rollback().await.unwrap();
    let result = h
        .coordinator
        .transfer(TransferRequest::new(a.id, b.id, 10))
        .await
        .unwrap();
    assert_eq!(result.to_account.balance, 10);
}

// ========================================================================
// Deadline Tests
// ========================================================================

#[tokio::test]
async fn test_deadline_elapses_behind_held_lock() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 100).await;
    let b = h.open("bob", Currency::Usd, 0).await;
    let rows_before = h.rows();

    let mut holder = h.store.begin().await.unwrap();
    holder.lock_account(a.id).await.unwrap();

    let deadline = Duration::from_millis(50);
    let err = h
        .coordinator
        .transfer_with_deadline(TransferRequest::new(a.id, b.id, 10), deadline)
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::Timeout(deadline));

    drop(holder);
    assert_eq!(h.balance(a.id).await, 100);
    assert_eq!(h.balance(b.id).await, 0);
    assert_eq!(h.rows(), rows_before);

    // Abandoned unit released its locks
    h.coordinator
        .transfer_with_deadline(TransferRequest::new(a.id, b.id, 10), deadline)
        .await
        .unwrap();
}

/// Memory ledger whose commit is applied before the acknowledgement arrives
struct SlowAckStore {
    inner: MemoryLedgerStore,
    ack_delay: Duration,
}

struct SlowAckTx {
    inner: Box<dyn LedgerTx>,
    ack_delay: Duration,
}

#[async_trait]
impl LedgerStore for SlowAckStore {
    fn name(&self) -> &'static str {
        "slow-ack"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        Ok(Box::new(SlowAckTx {
            inner: self.inner.begin().await?,
            ack_delay: self.ack_delay,
        }))
    }

    async fn create_account(&self, owner: &str, currency: Currency) -> Result<Account> {
        self.inner.create_account(owner, currency).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        self.inner.get_account(id).await
    }

    async fn list_accounts(&self, page: PageRequest) -> Result<Vec<Account>> {
        self.inner.list_accounts(page).await
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry> {
        self.inner.get_entry(id).await
    }

    async fn list_entries(
        &self,
        account_id: Option<AccountId>,
        page: PageRequest,
    ) -> Result<Vec<Entry>> {
        self.inner.list_entries(account_id, page).await
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer> {
        self.inner.get_transfer(id).await
    }

    async fn list_transfers(
        &self,
        account_id: Option<AccountId>,
        page: PageRequest,
    ) -> Result<Vec<Transfer>> {
        self.inner.list_transfers(account_id, page).await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

#[async_trait]
impl LedgerTx for SlowAckTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Account> {
        self.inner.lock_account(id).await
    }

    async fn adjust_balance(&mut self, id: AccountId, delta: Amount) -> Result<Account> {
        self.inner.adjust_balance(id, delta).await
    }

    async fn append_entry(&mut self, account_id: AccountId, amount: Amount) -> Result<Entry> {
        self.inner.append_entry(account_id, amount).await
    }

    async fn append_transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transfer> {
        self.inner.append_transfer(from, to, amount).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let SlowAckTx { inner, ack_delay } = *self;
        inner.commit().await?;
        tokio::time::sleep(ack_delay).await;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn test_commit_in_flight_outlives_deadline() {
    let memory = MemoryLedgerStore::new();
    let coordinator = TransferCoordinator::new(
        Arc::new(SlowAckStore {
            inner: memory.clone(),
            ack_delay: Duration::from_millis(100),
        }),
        fast_policy(),
    );
    let a = memory.create_account("alice", Currency::Usd).await.unwrap();
    let b = memory.create_account("bob", Currency::Usd).await.unwrap();
    coordinator.deposit(a.id, 100).await.unwrap();

    let result = coordinator
        .transfer_with_deadline(TransferRequest::new(a.id, b.id, 30), Duration::from_millis(50))
        .await
        .unwrap();

    assert_eq!(result.from_account.balance, 70);
    assert_eq!(memory.get_account(a.id).await.unwrap().balance, 70);
    assert_eq!(memory.get_account(b.id).await.unwrap().balance, 30);
    let (_, entries, transfers) = memory.row_counts().unwrap();
    assert_eq!((entries, transfers), (3, 1));
}

#[tokio::test]
async fn test_deadline_elapses_during_backoff() {
    let h = TestHarness::with_store(
        MemoryLedgerStore::new(),
        RetryPolicy {
            backoff_min: Duration::from_millis(200),
            backoff_max: Duration::from_millis(200),
            ..fast_policy()
        },
    );
    let a = h.open("alice", Currency::Usd, 100).await;
    let b = h.open("bob", Currency::Usd, 0).await;
    let rows_before = h.rows();

    h.store.inject_commit_conflicts(1);
    let deadline = Duration::from_millis(50);
    let err = h
        .coordinator
        .transfer_with_deadline(TransferRequest::new(a.id, b.id, 10), deadline)
        .await
        .unwrap_err();

    assert_eq!(err, LedgerError::Timeout(deadline));
    assert_eq!(h.balance(a.id).await, 100);
    assert_eq!(h.rows(), rows_before);
}

// ========================================================================
// Concurrency Tests
// ========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_do_not_deadlock() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 1_000).await;
    let b = h.open("bob", Currency::Usd, 1_000).await;

    const N: usize = 40;
    let handles: Vec<_> = (0..N)
        .map(|i| {
            let coordinator = h.coordinator.clone();
            let (from, to, amount) = if i % 2 == 0 {
                (a.id, b.id, 10)
            } else {
                (b.id, a.id, 7)
            };
            tokio::spawn(async move {
                coordinator
                    .transfer(TransferRequest::new(from, to, amount))
                    .await
            })
        })
        .collect();

    let results = tokio::time::timeout(Duration::from_secs(10), join_all(handles))
        .await
        .expect("transfers deadlocked");

    for r in results {
        r.unwrap().unwrap();
    }

    // 20 x (A->B 10) and 20 x (B->A 7)
    assert_eq!(h.balance(a.id).await, 1_000 - 200 + 140);
    assert_eq!(h.balance(b.id).await, 1_000 + 200 - 140);
    assert_eq!(h.rows().1, N);
    h.assert_conserved(&[a.id, b.id]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conservation_under_contention() {
    let h = TestHarness::new();
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(h.open(&format!("owner{}", i), Currency::Usd, 100).await.id);
    }

    // Ring of transfers, some of which will hit insufficient funds
    let handles: Vec<_> = (0..60)
        .map(|i| {
            let coordinator = h.coordinator.clone();
            let from = ids[i % ids.len()];
            let to = ids[(i * 3 + 1) % ids.len()];
            let amount = (i as Amount % 35) + 1;
            tokio::spawn(async move {
                coordinator
                    .transfer(TransferRequest::new(from, to, amount))
                    .await
            })
        })
        .collect();

    for r in join_all(handles).await {
        match r.unwrap() {
            Ok(_) => {}
            Err(LedgerError::InsufficientFunds { .. }) | Err(LedgerError::InvalidArgument(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let mut total = 0;
    for id in &ids {
        let balance = h.balance(*id).await;
        assert!(balance >= 0);
        total += balance;
    }
    assert_eq!(total, 500);
    h.assert_conserved(&ids).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disjoint_transfers_not_blocked() {
    let h = TestHarness::new();
    let a = h.open("a", Currency::Usd, 100).await;
    let b = h.open("b", Currency::Usd, 100).await;
    let c = h.open("c", Currency::Usd, 100).await;
    let d = h.open("d", Currency::Usd, 100).await;

    let mut holder = h.store.begin().await.unwrap();
    holder.lock_account(a.id).await.unwrap();
    holder.lock_account(b.id).await.unwrap();

    let result = h
        .coordinator
        .transfer_with_deadline(
            TransferRequest::new(c.id, d.id, 25),
            Duration::from_millis(500),
        )
        .await
        .unwrap();
    assert_eq!(result.to_account.balance, 125);

    holder.rollback().await.unwrap();
}

#[tokio::test]
async fn test_reads_are_idempotent() {
    let h = TestHarness::new();
    let a = h.open("alice", Currency::Usd, 100).await;
    let b = h.open("bob", Currency::Usd, 0).await;
    h.coordinator
        .transfer(TransferRequest::new(a.id, b.id, 1))
        .await
        .unwrap();

    let first = h.store.get_account(a.id).await.unwrap();
    let second = h.store.get_account(a.id).await.unwrap();
    assert_eq!(first, second);
}

// ========================================================================
// PostgreSQL Tests
// Run with: DATABASE_URL=postgresql://... cargo test -- --ignored
// ========================================================================

mod postgres {
    use super::*;
    use crate::db::Database;
    use crate::store::PgLedgerStore;

    async fn pg_harness() -> (PgLedgerStore, Arc<TransferCoordinator>) {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let db = Database::connect(&url, 10).await.expect("connect");
        db.ensure_schema().await.expect("schema");
        let store = PgLedgerStore::new(db).with_lock_timeout(Duration::from_secs(2));
        let coordinator = Arc::new(TransferCoordinator::new(Arc::new(store.clone()), fast_policy()));
        (store, coordinator)
    }

    async fn open(
        store: &PgLedgerStore,
        coordinator: &TransferCoordinator,
        owner: &str,
        balance: Amount,
    ) -> Account {
        let account = store.create_account(owner, Currency::Usd).await.unwrap();
        if balance > 0 {
            coordinator.deposit(account.id, balance).await.unwrap();
        }
        store.get_account(account.id).await.unwrap()
    }

    /// Entries on one account, fewer than a full page in these tests
    async fn entry_amounts(store: &PgLedgerStore, id: AccountId) -> Vec<Amount> {
        let page = PageRequest::new(1, 10).unwrap();
        store
            .list_entries(Some(id), page)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.amount)
            .collect()
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_pg_simple_transfer() {
        let (store, coordinator) = pg_harness().await;
        let a = open(&store, &coordinator, "pg-alice", 100).await;
        let b = open(&store, &coordinator, "pg-bob", 50).await;

        let result = coordinator
            .transfer(TransferRequest::new(a.id, b.id, 30))
            .await
            .unwrap();

        assert_eq!(result.from_account.balance, 70);
        assert_eq!(result.to_account.balance, 80);
        assert_eq!(store.get_account(a.id).await.unwrap().balance, 70);
        assert_eq!(store.get_account(b.id).await.unwrap().balance, 80);
        assert_eq!(store.get_transfer(result.transfer.id).await.unwrap(), result.transfer);
        assert_eq!(entry_amounts(&store, a.id).await, vec![100, -30]);
        assert_eq!(entry_amounts(&store, b.id).await, vec![50, 30]);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_pg_insufficient_funds_writes_nothing() {
        let (store, coordinator) = pg_harness().await;
        let a = open(&store, &coordinator, "pg-carol", 10).await;
        let b = open(&store, &coordinator, "pg-dave", 0).await;

        let err = coordinator
            .transfer(TransferRequest::new(a.id, b.id, 30))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account_id: a.id,
                balance: 10,
                requested: 30
            }
        );
        assert_eq!(store.get_account(a.id).await.unwrap().balance, 10);
        assert_eq!(store.get_account(b.id).await.unwrap().balance, 0);
        assert_eq!(entry_amounts(&store, a.id).await, vec![10]);
        assert!(entry_amounts(&store, b.id).await.is_empty());
        let page = PageRequest::new(1, 5).unwrap();
        assert!(store.list_transfers(Some(a.id), page).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires PostgreSQL database"]
    async fn test_pg_opposing_transfers_do_not_deadlock() {
        let (store, coordinator) = pg_harness().await;
        let a = open(&store, &coordinator, "pg-erin", 1_000).await;
        let b = open(&store, &coordinator, "pg-frank", 1_000).await;

        const N: usize = 20;
        let handles: Vec<_> = (0..N)
            .map(|i| {
                let coordinator = coordinator.clone();
                let (from, to, amount) = if i % 2 == 0 {
                    (a.id, b.id, 10)
                } else {
                    (b.id, a.id, 7)
                };
                tokio::spawn(async move {
                    coordinator
                        .transfer(TransferRequest::new(from, to, amount))
                        .await
                })
            })
            .collect();

        let results = tokio::time::timeout(Duration::from_secs(30), join_all(handles))
            .await
            .expect("transfers deadlocked");
        for r in results {
            r.unwrap().unwrap();
        }

        // 10 x (A->B 10) and 10 x (B->A 7)
        assert_eq!(store.get_account(a.id).await.unwrap().balance, 1_000 - 100 + 70);
        assert_eq!(store.get_account(b.id).await.unwrap().balance, 1_000 + 100 - 70);
    }
}

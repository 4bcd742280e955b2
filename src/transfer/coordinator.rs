//! Transfer Coordinator
//!
//! Drives one money movement through a single unit of work:
//! lock both accounts in ascending id order, adjust both balances, append the
//! transfer and its two entries, commit. Transient conflicts restart the unit
//! from the locking step with a jittered backoff. A deadline bounds everything
//! up to the commit; a commit in flight is always awaited.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::state::TransferState;
use super::types::{DepositResult, RetryPolicy, TransferRequest, TransferResult};
use crate::core_types::{AccountId, Amount};
use crate::error::{LedgerError, Result};
use crate::store::{LedgerStore, LedgerTx};

/// Per-call FSM tracker
struct Fsm {
    op: &'static str,
    state: TransferState,
    attempt: u32,
}

impl Fsm {
    fn new(op: &'static str) -> Self {
        Self {
            op,
            state: TransferState::Validating,
            attempt: 1,
        }
    }

    fn advance(&mut self, next: TransferState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(
            op = self.op,
            attempt = self.attempt,
            from = %self.state,
            to = %next,
            "state transition"
        );
        self.state = next;
    }

    /// Abort on an elapsed deadline
    fn expire(&mut self, deadline: Duration) -> LedgerError {
        self.advance(TransferState::AbortedFatal);
        LedgerError::Timeout(deadline)
    }
}

/// Transfer Coordinator - the only writer of transfers and entries
pub struct TransferCoordinator {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl TransferCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Move `amount` between two accounts under the configured deadline
    pub async fn transfer(&self, req: TransferRequest) -> Result<TransferResult> {
        self.transfer_with_deadline(req, self.policy.timeout).await
    }

    /// Move `amount` between two accounts under a caller-supplied deadline
    ///
    /// The deadline bounds locking, mutation and backoff. A commit that has
    /// started always runs to completion, so `Timeout` means nothing was
    /// written.
    ///
    /// # Errors
    /// - `InvalidArgument`: self-transfer, non-positive amount, currency mismatch
    /// - `NotFound`: either account missing
    /// - `InsufficientFunds`: source balance below `amount`
    /// - `Conflict`: retry budget exhausted
    /// - `Timeout`: `deadline` elapsed before commit; the unit is rolled back
    pub async fn transfer_with_deadline(
        &self,
        req: TransferRequest,
        deadline: Duration,
    ) -> Result<TransferResult> {
        let mut fsm = Fsm::new("transfer");

        // === Validation: nothing is opened for a malformed request ===
        if let Err(e) = validate_transfer(&req) {
            fsm.advance(TransferState::AbortedFatal);
            return Err(e);
        }

        let expires = Instant::now() + deadline;
        loop {
            fsm.advance(TransferState::Locking);
            let staged = match timeout_at(expires, self.stage_transfer(&mut fsm, req)).await {
                Ok(staged) => staged,
                Err(_) => {
                    warn!(
                        from = req.from_account_id,
                        to = req.to_account_id,
                        amount = req.amount,
                        ?deadline,
                        "Transfer deadline elapsed, unit rolled back"
                    );
                    return Err(fsm.expire(deadline));
                }
            };

            let outcome = match staged {
                Ok((tx, result)) => {
                    if Instant::now() >= expires {
                        drop(tx);
                        warn!(
                            from = req.from_account_id,
                            to = req.to_account_id,
                            ?deadline,
                            "Transfer deadline elapsed before commit, unit rolled back"
                        );
                        return Err(fsm.expire(deadline));
                    }
                    // Past this point the unit is never cancelled
                    fsm.advance(TransferState::Committing);
                    tx.commit().await.map(|()| result)
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(result) => {
                    fsm.advance(TransferState::Committed);
                    info!(
                        transfer_id = result.transfer.id,
                        from = req.from_account_id,
                        to = req.to_account_id,
                        amount = req.amount,
                        attempts = fsm.attempt,
                        "Transfer committed"
                    );
                    return Ok(result);
                }
                Err(e) => match timeout_at(expires, self.recover(&mut fsm, e)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(fatal)) => return Err(fatal),
                    Err(_) => {
                        warn!(
                            from = req.from_account_id,
                            to = req.to_account_id,
                            ?deadline,
                            "Transfer deadline elapsed during backoff"
                        );
                        return Err(fsm.expire(deadline));
                    }
                },
            }
        }
    }

    /// Credit `amount` to one account, writing a single entry
    pub async fn deposit(&self, account_id: AccountId, amount: Amount) -> Result<DepositResult> {
        let mut fsm = Fsm::new("deposit");

        if amount <= 0 {
            fsm.advance(TransferState::AbortedFatal);
            return Err(LedgerError::invalid(format!(
                "deposit amount must be positive, got {}",
                amount
            )));
        }

        let deadline = self.policy.timeout;
        let expires = Instant::now() + deadline;
        loop {
            fsm.advance(TransferState::Locking);
            let staged =
                match timeout_at(expires, self.stage_deposit(&mut fsm, account_id, amount)).await {
                    Ok(staged) => staged,
                    Err(_) => {
                        warn!(account_id, amount, ?deadline, "Deposit deadline elapsed");
                        return Err(fsm.expire(deadline));
                    }
                };

            let outcome = match staged {
                Ok((tx, result)) => {
                    if Instant::now() >= expires {
                        drop(tx);
                        warn!(account_id, amount, ?deadline, "Deposit deadline elapsed before commit");
                        return Err(fsm.expire(deadline));
                    }
                    fsm.advance(TransferState::Committing);
                    tx.commit().await.map(|()| result)
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(result) => {
                    fsm.advance(TransferState::Committed);
                    info!(
                        account_id,
                        amount,
                        entry_id = result.entry.id,
                        attempts = fsm.attempt,
                        "Deposit committed"
                    );
                    return Ok(result);
                }
                Err(e) => match timeout_at(expires, self.recover(&mut fsm, e)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(fatal)) => return Err(fatal),
                    Err(_) => {
                        warn!(account_id, amount, ?deadline, "Deposit deadline elapsed during backoff");
                        return Err(fsm.expire(deadline));
                    }
                },
            }
        }
    }

    /// Decide what happens after a failed attempt.
    ///
    /// Returns `Ok(())` after sleeping when another attempt is allowed,
    /// otherwise the error to surface.
    async fn recover(&self, fsm: &mut Fsm, err: LedgerError) -> Result<()> {
        if !err.is_retryable() {
            fsm.advance(TransferState::AbortedFatal);
            debug!(op = fsm.op, error = %err, "aborted");
            return Err(err);
        }

        if fsm.attempt >= self.policy.max_attempts {
            fsm.advance(TransferState::AbortedFatal);
            warn!(
                op = fsm.op,
                attempts = fsm.attempt,
                error = %err,
                "Retry budget exhausted"
            );
            return Err(LedgerError::conflict(format!(
                "{} (gave up after {} attempts)",
                conflict_message(&err),
                fsm.attempt
            )));
        }

        fsm.advance(TransferState::AbortedRetryable);
        let pause = self.policy.backoff();
        warn!(
            op = fsm.op,
            attempt = fsm.attempt,
            backoff_ms = pause.as_millis() as u64,
            error = %err,
            "Conflict, retrying"
        );
        tokio::time::sleep(pause).await;
        fsm.attempt += 1;
        Ok(())
    }

    /// Lock and mutate inside a fresh unit, leaving it uncommitted.
    /// Any early return drops the unit, which rolls it back.
    async fn stage_transfer(
        &self,
        fsm: &mut Fsm,
        req: TransferRequest,
    ) -> Result<(Box<dyn LedgerTx>, TransferResult)> {
        let mut tx = self.store.begin().await?;

        // Ascending id order on every path: no circular wait is possible
        let (first, second) = req.lock_order();
        let first = tx.lock_account(first).await?;
        let second = tx.lock_account(second).await?;
        let (from, to) = if first.id == req.from_account_id {
            (first, second)
        } else {
            (second, first)
        };

        if from.currency != to.currency {
            return Err(LedgerError::invalid(format!(
                "currency mismatch: account {} is {}, account {} is {}",
                from.id, from.currency, to.id, to.currency
            )));
        }

        fsm.advance(TransferState::Mutating);
        let from_account = tx.adjust_balance(from.id, -req.amount).await?;
        let to_account = tx.adjust_balance(to.id, req.amount).await?;
        let transfer = tx.append_transfer(from.id, to.id, req.amount).await?;
        let from_entry = tx.append_entry(from.id, -req.amount).await?;
        let to_entry = tx.append_entry(to.id, req.amount).await?;

        let result = TransferResult {
            transfer,
            from_entry,
            to_entry,
            from_account,
            to_account,
        };
        Ok((tx, result))
    }

    async fn stage_deposit(
        &self,
        fsm: &mut Fsm,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<(Box<dyn LedgerTx>, DepositResult)> {
        let mut tx = self.store.begin().await?;
        tx.lock_account(account_id).await?;

        fsm.advance(TransferState::Mutating);
        let account = tx.adjust_balance(account_id, amount).await?;
        let entry = tx.append_entry(account_id, amount).await?;

        Ok((tx, DepositResult { entry, account }))
    }
}

fn validate_transfer(req: &TransferRequest) -> Result<()> {
    if req.from_account_id == req.to_account_id {
        return Err(LedgerError::invalid(format!(
            "cannot transfer from account {} to itself",
            req.from_account_id
        )));
    }
    if req.amount <= 0 {
        return Err(LedgerError::invalid(format!(
            "transfer amount must be positive, got {}",
            req.amount
        )));
    }
    Ok(())
}

fn conflict_message(err: &LedgerError) -> &str {
    match err {
        LedgerError::Conflict(msg) => msg,
        _ => "conflict",
    }
}

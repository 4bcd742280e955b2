//! Atomic Transfer Orchestration
//!
//! Moves money between two accounts as one unit of work over the
//! [`LedgerStore`](crate::store::LedgerStore) port.
//!
//! # State Machine (per call)
//!
//! ```text
//! VALIDATING → LOCKING → MUTATING → COMMITTING → COMMITTED
//!      ↓          ↓          ↓           ↓
//!      └──────────┴──── ABORTED_FATAL ───┘
//!                 ↑
//!          ABORTED_RETRYABLE (conflict, backoff, back to LOCKING)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Ordered Locking**: both rows are locked in ascending account id order
//! 2. **All-or-Nothing**: balances, the transfer row and both entries commit together
//! 3. **Bounded Retry**: only `Conflict` is retried, at most `max_attempts` times
//! 4. **Deadline**: everything before commit, backoff included, is bounded; elapsing rolls back

pub mod coordinator;
pub mod state;
pub mod types;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use coordinator::TransferCoordinator;
pub use state::TransferState;
pub use types::{DepositResult, RetryPolicy, TransferRequest, TransferResult};

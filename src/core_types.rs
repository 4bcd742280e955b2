//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They match the `BIGINT`/`BIGSERIAL` columns of the ledger schema.

/// Account ID - assigned by the store, strictly increasing.
///
/// # Constraints:
/// - **Immutable**: Once assigned, NEVER changes
/// - **Positive**: Valid ids start at 1
/// - **Total order**: Lock acquisition always follows ascending account id
pub type AccountId = i64;

/// Entry ID - unique within the ledger
pub type EntryId = i64;

/// Transfer ID - unique within the ledger
pub type TransferId = i64;

/// Signed amount in minor units (e.g. cents).
///
/// Negative entry amounts are debits, positive are credits.
pub type Amount = i64;

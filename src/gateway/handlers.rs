//! HTTP handlers
//!
//! Thin plumbing: extract, call [`LedgerService`](crate::service::LedgerService),
//! map the result. No business rules live here.

pub mod account;
pub mod entry;
pub mod health;
pub mod transfer;

pub use account::{create_account, create_deposit, get_account, list_accounts};
pub use entry::{get_entry, list_entries};
pub use health::health_check;
pub use transfer::{create_transfer, get_transfer, list_transfers};

//! simple_bank - Double-Entry Ledger Service
//!
//! Accounts, append-only entries and transfers, with money moved between two
//! accounts as one atomic, deadlock-free unit of work.
//!
//! # Modules
//!
//! - [`core_types`] - Id and amount aliases
//! - [`models`] - Account, Entry, Transfer, Currency, PageRequest
//! - [`error`] - `LedgerError` taxonomy
//! - [`store`] - Storage port (`LedgerStore` / `LedgerTx`) and its adapters
//! - [`transfer`] - Transfer coordinator: ordered locking, retry, deadline
//! - [`service`] - `LedgerService` facade used by the gateway
//! - [`gateway`] - axum HTTP surface
//! - [`db`] - PostgreSQL pool and schema
//! - [`config`] / [`logging`] - process setup

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod service;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use core_types::{AccountId, Amount, EntryId, TransferId};
pub use error::LedgerError;
pub use models::{Account, Currency, Entry, PageRequest, Transfer};
pub use service::{CreateAccountRequest, LedgerService};
pub use store::{LedgerStore, LedgerTx, MemoryLedgerStore, PgLedgerStore};
pub use transfer::{
    DepositResult, RetryPolicy, TransferCoordinator, TransferRequest, TransferResult,
};

use std::sync::Arc;

use crate::service::LedgerService;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    /// Ledger facade (accounts, transfers, audit records)
    pub ledger: Arc<LedgerService>,
}

impl AppState {
    pub fn new(ledger: Arc<LedgerService>) -> Self {
        Self { ledger }
    }
}

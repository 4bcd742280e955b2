//! Transfer handlers

use std::sync::Arc;

use axum::extract::State;

use super::super::state::AppState;
use super::super::types::{
    ApiResult, IdPath, ListQuery, TransferApiRequest, ValidatedJson, ValidatedQuery, ok,
};
use crate::models::Transfer;
use crate::transfer::TransferResult;

/// Move money between two accounts
///
/// POST /transfers
///
/// Returns the transfer, both entries and both updated accounts.
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<TransferApiRequest>,
) -> ApiResult<TransferResult> {
    tracing::debug!(
        from = req.from_account_id,
        to = req.to_account_id,
        amount = req.amount,
        "transfer request"
    );
    ok(state.ledger.transfer(req.into()).await?)
}

/// GET /transfers/{id}
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    IdPath(id): IdPath,
) -> ApiResult<Transfer> {
    ok(state.ledger.get_transfer(id).await?)
}

/// GET /transfers?page_id=1&page_size=5[&account_id=N]
///
/// `account_id` matches either side of the transfer.
pub async fn list_transfers(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> ApiResult<Vec<Transfer>> {
    ok(state
        .ledger
        .list_transfers(query.account_id, query.page_id, query.page_size)
        .await?)
}

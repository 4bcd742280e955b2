//! Account handlers (open, read, list, deposit)

use std::sync::Arc;

use axum::extract::State;

use super::super::state::AppState;
use super::super::types::{
    ApiResult, CreateAccountRequest, DepositApiRequest, IdPath, ListQuery, ValidatedJson,
    ValidatedQuery, ok,
};
use crate::models::Account;
use crate::transfer::DepositResult;

/// Open an account with zero balance
///
/// POST /accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateAccountRequest>,
) -> ApiResult<Account> {
    ok(state.ledger.create_account(req).await?)
}

/// GET /accounts/{id}
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    IdPath(id): IdPath,
) -> ApiResult<Account> {
    ok(state.ledger.get_account(id).await?)
}

/// GET /accounts?page_id=1&page_size=5
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> ApiResult<Vec<Account>> {
    ok(state
        .ledger
        .list_accounts(query.page_id, query.page_size)
        .await?)
}

/// Credit an account
///
/// POST /accounts/{id}/deposits
pub async fn create_deposit(
    State(state): State<Arc<AppState>>,
    IdPath(id): IdPath,
    ValidatedJson(req): ValidatedJson<DepositApiRequest>,
) -> ApiResult<DepositResult> {
    ok(state.ledger.deposit(id, req.amount).await?)
}

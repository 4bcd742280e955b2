//! Entry handlers (read-only audit log)

use std::sync::Arc;

use axum::extract::State;

use super::super::state::AppState;
use super::super::types::{ApiResult, IdPath, ListQuery, ValidatedQuery, ok};
use crate::models::Entry;

/// GET /entries/{id}
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    IdPath(id): IdPath,
) -> ApiResult<Entry> {
    ok(state.ledger.get_entry(id).await?)
}

/// GET /entries?page_id=1&page_size=5[&account_id=N]
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> ApiResult<Vec<Entry>> {
    ok(state
        .ledger
        .list_entries(query.account_id, query.page_id, query.page_size)
        .await?)
}

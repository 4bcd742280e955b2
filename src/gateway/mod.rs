pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use state::AppState;

/// Build the HTTP router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Accounts
        .route(
            "/accounts",
            post(handlers::create_account).get(handlers::list_accounts),
        )
        .route("/accounts/{id}", get(handlers::get_account))
        .route("/accounts/{id}/deposits", post(handlers::create_deposit))
        // Money movement
        .route(
            "/transfers",
            post(handlers::create_transfer).get(handlers::list_transfers),
        )
        .route("/transfers/{id}", get(handlers::get_transfer))
        // Audit log
        .route("/entries", get(handlers::list_entries))
        .route("/entries/{id}", get(handlers::get_entry))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped
pub async fn run_server(addr: &str, state: Arc<AppState>) -> std::io::Result<()> {
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await.inspect_err(|e| {
        tracing::error!("FATAL: Failed to bind to {}: {}", addr, e);
    })?;

    tracing::info!("Gateway listening on http://{}", addr);
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!("FATAL: Server error: {}", e);
    })
}

//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use super::super::state::AppState;
use super::super::types::{ApiError, HealthResponse};

/// Health check endpoint
///
/// Pings the storage backend. Does NOT expose failure details.
///
/// - Healthy: 200 OK + {status: "ok", version, backend}
/// - Unhealthy: 503 Service Unavailable + {code: "UNAVAILABLE", msg}
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<HealthResponse>), ApiError> {
    match state.ledger.health_check().await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                version: env!("GIT_HASH").to_string(),
                backend: state.ledger.backend().to_string(),
            }),
        )),
        Err(e) => {
            tracing::error!("[HEALTH] storage ping failed: {}", e);
            Err(ApiError::service_unavailable("unavailable"))
        }
    }
}

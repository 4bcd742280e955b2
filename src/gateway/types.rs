//! Gateway boundary types
//!
//! - [`ApiError`] / [`ApiResult`]: error body `{"code", "msg"}` with status
//! - Request DTOs with declarative constraints (`validator`)
//! - [`ValidatedJson`], [`ValidatedQuery`], [`IdPath`]: extractors that reject
//!   malformed input with 400 before a handler runs

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use validator::Validate;

use crate::core_types::{AccountId, Amount};
use crate::error::LedgerError;
use crate::transfer::TransferRequest;

// ============================================================================
// Errors
// ============================================================================

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}

/// HTTP error: status plus stable code and message
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub msg: String,
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Wrap a successful payload
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(data))
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let msg = match &e {
            // Details stay in the log
            LedgerError::Internal(detail) => {
                tracing::error!(error = %detail, "internal ledger error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        Self::new(status, e.code(), msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            code: self.code.to_string(),
            msg: self.msg,
        });
        (self.status, body).into_response()
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

pub use crate::service::CreateAccountRequest;

/// Pagination query, optionally scoped to one account
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListQuery {
    #[validate(range(min = 1, message = "page_id must be >= 1"))]
    pub page_id: i64,
    #[validate(range(min = 5, max = 10, message = "page_size must be between 5 and 10"))]
    pub page_size: i64,
    #[validate(range(min = 1, message = "account_id must be >= 1"))]
    pub account_id: Option<AccountId>,
}

/// POST /transfers body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransferApiRequest {
    #[validate(range(min = 1))]
    pub from_account_id: AccountId,
    #[validate(range(min = 1))]
    pub to_account_id: AccountId,
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount: Amount,
}

impl From<TransferApiRequest> for TransferRequest {
    fn from(req: TransferApiRequest) -> Self {
        TransferRequest::new(req.from_account_id, req.to_account_id, req.amount)
    }
}

/// POST /accounts/{id}/deposits body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DepositApiRequest {
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount: Amount,
}

/// GET /health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
}

// ============================================================================
// Extractors
// ============================================================================

/// JSON body that has passed its `validator` constraints
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(ValidatedJson(value))
    }
}

/// Query string that has passed its `validator` constraints
#[derive(Debug)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(ValidatedQuery(value))
    }
}

/// Numeric `{id}` path segment, must be >= 1
#[derive(Debug, Clone, Copy)]
pub struct IdPath(pub i64);

impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        if id < 1 {
            return Err(ApiError::bad_request(format!("id must be >= 1, got {}", id)));
        }
        Ok(IdPath(id))
    }
}

//! REST endpoints
//!
//! - `POST /auth/login`, `POST /auth/logout` - session cookie issue and clear
//! - `GET|POST /api/orders`, `GET|PATCH|DELETE /api/orders/:id` - order CRUD;
//!   every successful write becomes one change event on the stream
//! - `GET /api/orders/stats` - dashboard counters
//! - `GET /api/clients` - live subscriber count
//! - `GET /api/users`, `PATCH /api/users/:id/role`, `DELETE /api/users/:id`

pub mod auth;
pub mod orders;
pub mod users;

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::api::websocket::AppState;
use crate::auth::Permission;
use crate::error::{AdmissionError, AuthError, FieldError, StoreError};
use crate::types::User;

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 1000;

/// Page-number pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: usize,
    /// Page size, at most [`MAX_LIMIT`]
    pub limit: usize,
}

impl PaginationParams {
    /// Fill in [`DEFAULT_PAGE`] and [`DEFAULT_LIMIT`] for absent query values
    pub fn new(page: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(DEFAULT_PAGE),
            limit: limit.unwrap_or(DEFAULT_LIMIT),
        }
    }

    pub fn normalized_page(&self) -> usize {
        self.page.max(1)
    }

    pub fn normalized_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> usize {
        (self.normalized_page() - 1).saturating_mul(self.normalized_limit())
    }

    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.normalized_limit())
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.to_string(),
            errors: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(errors) => Self {
                errors: Some(errors),
                ..Self::bad_request("validation failed")
            },
            StoreError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            StoreError::Conflict(reason) => Self::conflict(reason),
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::InsufficientCapability => Self::forbidden(err.to_string()),
            AdmissionError::NoCredential | AdmissionError::UnknownPrincipal => {
                Self::unauthorized(err.to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::unauthorized(err.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// Resolve the caller and require `permission` of their current role
pub async fn require(
    state: &AppState,
    headers: &HeaderMap,
    permission: Permission,
) -> Result<User, ApiError> {
    Ok(state.gate.authorize(headers, permission).await?)
}

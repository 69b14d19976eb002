//! Login and logout

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ApiError;
use crate::api::websocket::AppState;
use crate::types::User;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: User,
}

fn session_cookie(name: &str, value: &str, max_age: i64) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, value, max_age
    ))
    .map_err(|e| ApiError::internal(e.to_string()))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;

    let user = state
        .auth
        .authenticate(&state.users, &request.username, &request.password)
        .await
        .map_err(|e| {
            debug!(username = %request.username, error = %e, "login failed");
            ApiError::from(e)
        })?;
    let token = state.auth.issue_token(&user)?;
    let cookie = session_cookie(state.gate.cookie_name(), &token.token, token.expires_in)?;

    info!(user = %user.username, role = %user.role, "login");
    let body = LoginResponse {
        token: token.token,
        token_type: token.token_type,
        expires_in: token.expires_in,
        user,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// POST /auth/logout
///
/// Clears the cookie. Issued tokens stay valid until they expire.
pub async fn logout(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let cookie = session_cookie(state.gate.cookie_name(), "", 0)?;
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

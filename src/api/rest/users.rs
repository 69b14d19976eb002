//! User administration endpoints

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use super::{require, ApiError};
use crate::api::websocket::AppState;
use crate::auth::Permission;
use crate::types::{Role, User};

/// GET /api/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, ApiError> {
    require(&state, &headers, Permission::UsersRead).await?;
    Ok(Json(state.users.list_users().await))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// PATCH /api/users/:id/role
///
/// The new role applies to the next admission; open subscriber connections
/// keep the identity they were admitted with.
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    require(&state, &headers, Permission::UsersUpdate).await?;
    let Json(request) = body?;
    state
        .users
        .update_role(&id, request.role)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("user '{}' not found", id)))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let caller = require(&state, &headers, Permission::UsersDelete).await?;
    if caller.id == id {
        return Err(ApiError::bad_request("cannot delete your own account"));
    }
    if state.users.remove_user(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("user '{}' not found", id)))
    }
}

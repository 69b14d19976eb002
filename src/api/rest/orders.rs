//! Order endpoints

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{require, ApiError, PaginationParams};
use crate::api::websocket::AppState;
use crate::auth::Permission;
use crate::types::{NewOrder, Order, OrderPatch, OrderStats, OrderStatus};

/// Query parameters for listing orders
#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    /// Case-insensitive match on customer, email, product or id
    pub search: Option<String>,
    /// Status filter; `all` or absent means no filter
    pub status: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl ListOrdersParams {
    fn pagination(&self) -> PaginationParams {
        PaginationParams::new(self.page, self.limit)
    }

    fn status_filter(&self) -> Result<Option<OrderStatus>, ApiError> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(raw) => OrderStatus::parse(raw)
                .map(Some)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status '{}'", raw))),
        }
    }
}

/// One page of orders
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<OrderListResponse>, ApiError> {
    require(&state, &headers, Permission::OrdersRead).await?;

    let status = params.status_filter()?;
    let pagination = params.pagination();
    let page = state
        .orders
        .get_orders(
            params.search.as_deref(),
            status,
            pagination.normalized_limit(),
            pagination.offset(),
        )
        .await;

    Ok(Json(OrderListResponse {
        total_pages: pagination.total_pages(page.total),
        total: page.total,
        page: pagination.normalized_page(),
        orders: page.items,
    }))
}

/// GET /api/orders/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<OrderStats>, ApiError> {
    require(&state, &headers, Permission::OrdersRead).await?;
    Ok(Json(state.orders.get_order_stats().await))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    require(&state, &headers, Permission::OrdersRead).await?;
    state
        .orders
        .get_order(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("order '{}' not found", id)))
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<NewOrder>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require(&state, &headers, Permission::OrdersCreate).await?;
    let Json(new) = body?;
    let order = state.orders.create_order(new).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// PATCH /api/orders/:id
pub async fn update_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<OrderPatch>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    require(&state, &headers, Permission::OrdersUpdate).await?;
    let Json(patch) = body?;
    Ok(Json(state.orders.update_order(&id, patch).await?))
}

/// DELETE /api/orders/:id
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require(&state, &headers, Permission::OrdersDelete).await?;
    state.orders.delete_order(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Live subscriber count
#[derive(Debug, Serialize)]
pub struct ClientCountResponse {
    pub count: usize,
}

/// GET /api/clients
pub async fn client_count(State(state): State<Arc<AppState>>) -> Json<ClientCountResponse> {
    Json(ClientCountResponse {
        count: state.client_count(),
    })
}

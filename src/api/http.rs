//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::rest::{auth, orders, users};
use super::websocket::{ws_handler, AppState};

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    // Browsers never get the session cookie cross-origin: the WebSocket
    // endpoint checks Origin itself and the cookie is SameSite=Strict.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(&state.config.ws_path, get(ws_handler))
        .route("/health", get(health_check))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/api/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/orders/stats", get(orders::get_stats))
        .route(
            "/api/orders/:id",
            get(orders::get_order)
                .patch(orders::update_order)
                .delete(orders::delete_order),
        )
        .route("/api/clients", get(orders::client_count))
        .route("/api/users", get(users::list_users))
        .route("/api/users/:id", axum::routing::delete(users::delete_user))
        .route("/api/users/:id/role", patch(users::update_role))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

//! Server assembly
//!
//! Wires the stores, the session authority, the subscriber registry and the
//! broadcaster together, then serves the router until shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::http::create_router;
use crate::api::websocket::AppState;
use crate::auth::SessionAuth;
use crate::broadcast::{Broadcaster, SlowConsumerPolicy};
use crate::config::{SeedUser, ServerConfig};
use crate::error::ServerError;
use crate::registry::SubscriberRegistry;
use crate::store::{ChannelChangeSource, OrderStore, UserStore};
use crate::types::Role;

/// A fully wired server that has not started serving yet
pub struct App {
    state: Arc<AppState>,
    broadcaster: Broadcaster,
    source: ChannelChangeSource,
}

impl App {
    /// Build every component from configuration and seed the user store
    pub async fn from_config(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let auth = match config.jwt_secret {
            Some(ref secret) => SessionAuth::new(secret)?,
            None => {
                warn!("ORDER_STREAM_JWT_SECRET not set; sessions end when the process exits");
                SessionAuth::ephemeral()
            }
        }
        .with_token_ttl(config.token_ttl)
        .with_bcrypt_cost(config.bcrypt_cost);

        let users = UserStore::new();
        let seeds = if config.users.is_empty() {
            warn!("no users configured; seeding development account admin/admin");
            vec![SeedUser {
                username: "admin".to_string(),
                password: "admin".to_string(),
                role: Role::Admin,
            }]
        } else {
            config.users.clone()
        };
        for seed in &seeds {
            let hash = auth.hash_password_async(&seed.password).await?;
            users.add_user(&seed.username, hash, seed.role).await?;
        }
        info!(count = seeds.len(), "users seeded");

        let (orders, source) = OrderStore::new();
        let registry = Arc::new(SubscriberRegistry::new());

        let policy = if config.evict_slow_consumers {
            SlowConsumerPolicy::Disconnect
        } else {
            SlowConsumerPolicy::Drop
        };
        let broadcaster = Broadcaster::new(registry.clone()).with_slow_consumer_policy(policy);

        let state = Arc::new(AppState::new(
            config,
            Arc::new(orders),
            Arc::new(users),
            Arc::new(auth),
            registry,
        ));

        Ok(Self {
            state,
            broadcaster,
            source,
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Start the broadcaster and serve on `listener` until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let broadcaster = tokio::spawn(self.broadcaster.run(self.source));

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "order stream server listening");
        }
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        // Upgraded sockets may still hold the order store, keeping the
        // change source open.
        broadcaster.abort();
        info!("server stopped");
        result.map_err(ServerError::from)
    }
}

/// Bind the configured address and serve until Ctrl+C
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let addr: SocketAddr = config.bind_addr;
    let app = App::from_config(config).await?;
    let listener = TcpListener::bind(addr).await?;

    app.serve(listener, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down");
        }
    })
    .await
}

//! Shared application state

use std::sync::Arc;

use crate::auth::{ConnectionGate, SessionAuth};
use crate::config::ServerConfig;
use crate::registry::SubscriberRegistry;
use crate::store::{OrderStore, UserStore};

/// State shared by every HTTP and WebSocket handler
pub struct AppState {
    pub config: ServerConfig,
    pub orders: Arc<OrderStore>,
    pub users: Arc<UserStore>,
    pub auth: Arc<SessionAuth>,
    pub gate: ConnectionGate,
    pub registry: Arc<SubscriberRegistry>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        orders: Arc<OrderStore>,
        users: Arc<UserStore>,
        auth: Arc<SessionAuth>,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        let gate = ConnectionGate::new(auth.clone(), users.clone(), config.cookie_name.clone());
        Self {
            config,
            orders,
            users,
            auth,
            gate,
            registry,
        }
    }

    /// Number of live subscribers
    pub fn client_count(&self) -> usize {
        self.registry.count()
    }
}

//! WebSocket endpoint for live order changes
//!
//! Each upgrade passes the [`ConnectionGate`](crate::auth::ConnectionGate)
//! before the protocol switch. Admitted sockets get a bounded outbound queue
//! registered with the [`SubscriberRegistry`](crate::registry::SubscriberRegistry);
//! the broadcaster fills it and the socket task drains it.

pub mod handler;
pub mod state;

pub use handler::ws_handler;
pub use state::AppState;

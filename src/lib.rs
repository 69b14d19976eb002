//! Order Stream
//!
//! Real-time order change notifications over WebSocket. Every committed
//! insert, update or delete on the order store becomes one change event,
//! which a single broadcaster fans out to every admitted subscriber together
//! with the live subscriber count.
//!
//! # Modules
//!
//! - `types`: Orders, users, change events and the wire envelope
//! - `validation`: Field rules for order payloads
//! - `store`: In-memory order and user stores; the change source
//! - `auth`: Session credentials, role permissions and the connection gate
//! - `registry`: Thread-safe set of live subscribers
//! - `broadcast`: Fan-out of change events and subscriber counts
//! - `api`: Axum router, REST handlers and the WebSocket endpoint
//! - `client`: Reconnecting subscriber session
//! - `config`: Environment-driven server configuration
//! - `server`: Assembly and serving
//!
//! # Example
//!
//! ```no_run
//! use order_stream::{server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), order_stream::ServerError> {
//!     let config = ServerConfig::from_env()?;
//!     server::run(config).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used items at crate root
pub use auth::{ConnectionGate, Permission, SessionAuth};
pub use broadcast::{Broadcaster, DispatchReport, EventFilter, SlowConsumerPolicy};
pub use client::{BackoffPolicy, ConnectionSession, SessionConfig, SessionHandle, SessionState};
pub use config::ServerConfig;
pub use error::{AdmissionError, DeliveryError, ServerError, SessionError, SourceGapError};
pub use registry::{ConnectionId, Subscriber, SubscriberRegistry};
pub use server::App;
pub use store::{ChangeSource, OrderStore, UserStore};
pub use types::{ChangeEvent, Operation, Order, ServerMessage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

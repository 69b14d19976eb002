//! Subscriber-side session for the order change stream
//!
//! [`ConnectionSession`] keeps one connection to the server's WebSocket
//! endpoint alive: it connects, routes incoming envelopes by `type` to
//! registered handlers, and reconnects after a backoff whenever the
//! connection fails or drops.
//!
//! The network side sits behind the [`Connector`] and [`Transport`] traits so
//! the reconnect logic can be driven by an in-memory transport in tests.
//!
//! ```no_run
//! use order_stream::client::{ConnectionSession, Credential, SessionConfig, WsConnector};
//!
//! # async fn demo(token: String) {
//! let config = SessionConfig::new("ws://127.0.0.1:5000/ws")
//!     .with_credential(Credential::Bearer(token));
//!
//! let handle = ConnectionSession::new(config, WsConnector)
//!     .on_order_change(|change| println!("{} {}", change.operation, change.data.id))
//!     .on_client_count(|count| println!("{} viewers", count))
//!     .spawn();
//!
//! // ...
//! handle.shutdown().await;
//! # }
//! ```

mod session;
mod transport;

pub use session::{
    BackoffPolicy, ConnectionSession, Credential, SessionConfig, SessionHandle, SessionState,
};
pub use transport::{Connector, Transport, WsConnector, WsTransport};

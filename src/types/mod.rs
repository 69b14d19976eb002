//! Data types shared across the pipeline
//!
//! Order records, principals, change events, and the wire envelopes that
//! carry them to subscribers.

mod change;
mod message;
mod order;
mod user;

pub use change::{ChangeEvent, Operation};
pub use message::{
    ClientMessage, OrderChangePayload, PongMessage, RawEnvelope, ServerMessage, CLIENT_COUNT,
    ORDER_CHANGE,
};
pub use order::{NewOrder, Order, OrderPatch, OrderStats, OrderStatus};
pub use user::{AuthorizedIdentity, Role, User};

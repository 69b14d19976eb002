//! Storage collaborators
//!
//! In-memory stand-ins for the relational order and user tables. The order
//! store is the commit hook of the pipeline: every successful write emits a
//! [`ChangeEvent`](crate::types::ChangeEvent) into a [`ChangeSink`] while the
//! write lock is still held, so events leave in commit order.

mod orders;
mod source;
mod users;

pub use orders::{OrderPage, OrderStore};
pub use source::{change_channel, ChangeSink, ChangeSource, ChannelChangeSource};
pub use users::UserStore;

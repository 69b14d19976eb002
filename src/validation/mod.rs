//! Field validation for order write payloads
//!
//! Collects every failing field instead of stopping at the first one, so the
//! REST layer can report them together.

mod order;

pub use order::{validate_amount, validate_new_order, validate_order_patch};

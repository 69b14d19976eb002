//! Change events captured at commit time
//!
//! A [`ChangeEvent`] is built the instant a write commits, handed to the
//! broadcaster once, and then discarded. The variants make the snapshot
//! invariant structural: inserts carry only the post-image, deletes only the
//! pre-image, updates both.

use serde::{Deserialize, Serialize};

use super::Order;

/// Kind of mutation, named the way it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "INSERT")]
    Created,
    #[serde(rename = "UPDATE")]
    Updated,
    #[serde(rename = "DELETE")]
    Deleted,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Created => write!(f, "INSERT"),
            Operation::Updated => write!(f, "UPDATE"),
            Operation::Deleted => write!(f, "DELETE"),
        }
    }
}

/// One committed mutation of an order record
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Created { entity: Order },
    Updated { entity: Order, previous: Order },
    Deleted { previous: Order },
}

impl ChangeEvent {
    pub fn operation(&self) -> Operation {
        match self {
            ChangeEvent::Created { .. } => Operation::Created,
            ChangeEvent::Updated { .. } => Operation::Updated,
            ChangeEvent::Deleted { .. } => Operation::Deleted,
        }
    }

    /// Post-image, absent for deletes
    pub fn entity(&self) -> Option<&Order> {
        match self {
            ChangeEvent::Created { entity } | ChangeEvent::Updated { entity, .. } => Some(entity),
            ChangeEvent::Deleted { .. } => None,
        }
    }

    /// Pre-image, absent for inserts
    pub fn previous(&self) -> Option<&Order> {
        match self {
            ChangeEvent::Updated { previous, .. } | ChangeEvent::Deleted { previous } => {
                Some(previous)
            }
            ChangeEvent::Created { .. } => None,
        }
    }

    /// The authoritative snapshot: post-image, or pre-image for deletes
    pub fn snapshot(&self) -> &Order {
        match self {
            ChangeEvent::Created { entity } | ChangeEvent::Updated { entity, .. } => entity,
            ChangeEvent::Deleted { previous } => previous,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.snapshot().id
    }
}

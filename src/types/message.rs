//! Wire envelopes exchanged over the `/ws` connection
//!
//! Every frame is one JSON object of the form `{"type": ..., "data": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChangeEvent, Operation, Order};

/// Envelope `type` for order mutations
pub const ORDER_CHANGE: &str = "order_change";

/// Envelope `type` for subscriber count updates
pub const CLIENT_COUNT: &str = "client_count";

/// Payload of an `order_change` envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderChangePayload {
    pub operation: Operation,
    /// Post-image for INSERT/UPDATE, pre-image for DELETE
    pub data: Order,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_data: Option<Order>,
}

impl From<ChangeEvent> for OrderChangePayload {
    fn from(event: ChangeEvent) -> Self {
        match event {
            ChangeEvent::Created { entity } => Self {
                operation: Operation::Created,
                data: entity,
                old_data: None,
            },
            ChangeEvent::Updated { entity, previous } => Self {
                operation: Operation::Updated,
                data: entity,
                old_data: Some(previous),
            },
            ChangeEvent::Deleted { previous } => Self {
                operation: Operation::Deleted,
                data: previous,
                old_data: None,
            },
        }
    }
}

/// Messages pushed from the server to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// An order was inserted, updated, or deleted
    OrderChange(OrderChangePayload),

    /// Current number of live subscribers
    ClientCount { count: usize },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::OrderChange(_) => ORDER_CHANGE,
            ServerMessage::ClientCount { .. } => CLIENT_COUNT,
        }
    }

    /// Serialize to a single text frame
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<ChangeEvent> for ServerMessage {
    fn from(event: ChangeEvent) -> Self {
        ServerMessage::OrderChange(event.into())
    }
}

/// Untyped view of an incoming envelope, used for routing by `type`
#[derive(Clone, Debug, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Messages a subscriber may send to the server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Application-level heartbeat
    Ping,
}

/// Reply to [`ClientMessage::Ping`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PongMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl Default for PongMessage {
    fn default() -> Self {
        Self {
            msg_type: "pong".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewOrder, OrderStatus};
    use chrono::Utc;

    fn order(id: &str, sku: &str) -> Order {
        Order::from_new(
            id.to_string(),
            NewOrder {
                customer_name: "A".to_string(),
                customer_email: "a@x.com".to_string(),
                product_name: "Widget".to_string(),
                product_sku: sku.to_string(),
                amount: "9.99".to_string(),
                status: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_insert_envelope_shape() {
        let msg = ServerMessage::from(ChangeEvent::Created {
            entity: order("o1", "W-1"),
        });
        let json: Value = serde_json::from_str(&msg.to_frame().unwrap()).unwrap();

        assert_eq!(json["type"], "order_change");
        assert_eq!(json["data"]["operation"], "INSERT");
        assert_eq!(json["data"]["data"]["productSku"], "W-1");
        assert!(json["data"].get("old_data").is_none());
    }

    #[test]
    fn test_update_envelope_includes_old_data() {
        let previous = order("o1", "W-1");
        let mut entity = previous.clone();
        entity.status = OrderStatus::Processing;
        let msg = ServerMessage::from(ChangeEvent::Updated { entity, previous });
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["data"]["operation"], "UPDATE");
        assert_eq!(json["data"]["data"]["status"], "processing");
        assert_eq!(json["data"]["old_data"]["status"], "pending");
    }

    #[test]
    fn test_delete_envelope_carries_pre_image() {
        let msg = ServerMessage::from(ChangeEvent::Deleted {
            previous: order("o9", "W-9"),
        });
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["data"]["operation"], "DELETE");
        assert_eq!(json["data"]["data"]["id"], "o9");
    }

    #[test]
    fn test_client_count_envelope() {
        let msg = ServerMessage::ClientCount { count: 3 };
        assert_eq!(msg.to_frame().unwrap(), r#"{"type":"client_count","data":{"count":3}}"#);
        assert_eq!(msg.kind(), CLIENT_COUNT);
    }

    #[test]
    fn test_raw_envelope_tolerates_unknown_type() {
        let raw: RawEnvelope = serde_json::from_str(r#"{"type":"surprise"}"#).unwrap();
        assert_eq!(raw.kind, "surprise");
        assert!(raw.data.is_null());
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }
}

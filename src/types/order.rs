//! Order records and the write payloads that produce them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Orders still moving through fulfilment
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Shipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a status filter value; `None` for unknown strings
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed order record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub product_name: String,
    pub product_sku: String,
    /// Decimal with at most two fractional digits, kept as text
    pub amount: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new record from a validated payload
    pub fn from_new(id: String, new: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id,
            customer_name: new.customer_name,
            customer_email: new.customer_email,
            product_name: new.product_name,
            product_sku: new.product_sku,
            amount: new.amount.trim().to_string(),
            status: new.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the present fields of a patch
    pub fn apply(&mut self, patch: OrderPatch, now: DateTime<Utc>) {
        if let Some(v) = patch.customer_name {
            self.customer_name = v;
        }
        if let Some(v) = patch.customer_email {
            self.customer_email = v;
        }
        if let Some(v) = patch.product_name {
            self.product_name = v;
        }
        if let Some(v) = patch.product_sku {
            self.product_sku = v;
        }
        if let Some(v) = patch.amount {
            self.amount = v.trim().to_string();
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        self.updated_at = now;
    }

    /// Amount as a float for aggregate statistics
    pub fn amount_value(&self) -> f64 {
        self.amount.parse().unwrap_or(0.0)
    }

    /// Case-insensitive match used by the order search
    pub fn matches_search(&self, needle_lower: &str) -> bool {
        [
            &self.customer_name,
            &self.customer_email,
            &self.product_name,
            &self.id,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle_lower))
    }
}

/// Payload for creating an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_email: String,
    pub product_name: String,
    pub product_sku: String,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

/// Aggregate dashboard figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: usize,
    pub active_orders: usize,
    pub completed_orders: usize,
    pub revenue: f64,
}

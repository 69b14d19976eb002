//! Order table with a commit hook

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::source::{change_channel, ChangeSink, ChannelChangeSource};
use crate::error::StoreError;
use crate::types::{ChangeEvent, NewOrder, Order, OrderPatch, OrderStats, OrderStatus};
use crate::validation::{validate_new_order, validate_order_patch};

/// One page of a filtered order listing
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub items: Vec<Order>,
    pub total: usize,
}

/// In-memory order store.
///
/// Rows are kept in insertion order; listings return newest first.
pub struct OrderStore {
    orders: RwLock<Vec<Order>>,
    changes: ChangeSink,
}

impl OrderStore {
    /// Create a store together with the change source it feeds
    pub fn new() -> (Self, ChannelChangeSource) {
        let (changes, source) = change_channel();
        (Self::with_sink(changes), source)
    }

    /// Create a store publishing into an existing sink
    pub fn with_sink(changes: ChangeSink) -> Self {
        Self {
            orders: RwLock::new(Vec::new()),
            changes,
        }
    }

    /// Filtered, paginated listing, newest first
    pub async fn get_orders(
        &self,
        search: Option<&str>,
        status: Option<OrderStatus>,
        limit: usize,
        offset: usize,
    ) -> OrderPage {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let orders = self.orders.read().await;
        let matching: Vec<&Order> = orders
            .iter()
            .rev()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .filter(|o| needle.as_deref().map_or(true, |n| o.matches_search(n)))
            .collect();

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        OrderPage { items, total }
    }

    pub async fn get_order(&self, id: &str) -> Option<Order> {
        self.orders.read().await.iter().find(|o| o.id == id).cloned()
    }

    /// Insert a validated order and emit `INSERT`
    pub async fn create_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        validate_new_order(&new)?;
        let order = Order::from_new(Uuid::new_v4().to_string(), new, Utc::now());

        let mut orders = self.orders.write().await;
        orders.push(order.clone());
        let _ = self.changes.emit(ChangeEvent::Created {
            entity: order.clone(),
        });
        debug!(order_id = %order.id, "order created");
        Ok(order)
    }

    /// Apply a validated patch and emit `UPDATE` with both images
    pub async fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order, StoreError> {
        validate_order_patch(&patch)?;

        let mut orders = self.orders.write().await;
        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("order '{}'", id)))?;

        let previous = order.clone();
        order.apply(patch, Utc::now());
        let updated = order.clone();

        let _ = self.changes.emit(ChangeEvent::Updated {
            entity: updated.clone(),
            previous,
        });
        debug!(order_id = %id, "order updated");
        Ok(updated)
    }

    /// Remove an order and emit `DELETE` with its pre-image
    pub async fn delete_order(&self, id: &str) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let index = orders
            .iter()
            .position(|o| o.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("order '{}'", id)))?;

        let previous = orders.remove(index);
        let _ = self.changes.emit(ChangeEvent::Deleted { previous });
        debug!(order_id = %id, "order deleted");
        Ok(())
    }

    pub async fn get_order_stats(&self) -> OrderStats {
        let orders = self.orders.read().await;
        orders.iter().fold(
            OrderStats {
                total_orders: orders.len(),
                ..Default::default()
            },
            |mut stats, order| {
                if order.status.is_active() {
                    stats.active_orders += 1;
                }
                if order.status == OrderStatus::Delivered {
                    stats.completed_orders += 1;
                    stats.revenue += order.amount_value();
                }
                stats
            },
        )
    }
}

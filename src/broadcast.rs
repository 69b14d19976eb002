//! Change fan-out
//!
//! The broadcaster is a single loop that consumes committed changes and pushes
//! each one to every eligible subscriber. Events are dispatched strictly one at
//! a time, so each subscriber sees them in emission order. Sends never block:
//! a dead transport is pruned, a full one loses only this frame, and neither
//! affects anyone else.
//!
//! Subscriber-count updates ride the same path at lower priority. They are
//! read from the registry's `watch` channel, so a burst of joins and leaves
//! between two ticks collapses into one message carrying the latest count.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, trace};

use crate::error::DeliveryError;
use crate::registry::{Frame, SubscriberRegistry};
use crate::store::ChangeSource;
use crate::types::{AuthorizedIdentity, ServerMessage};

/// Decides whether a subscriber should receive a message.
///
/// Every subscriber sees every event by default; role-scoped delivery plugs in here.
pub trait EventFilter: Send + Sync {
    fn accepts(&self, identity: &AuthorizedIdentity, message: &ServerMessage) -> bool;
}

/// Delivers everything to everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl EventFilter for AllowAll {
    fn accepts(&self, _identity: &AuthorizedIdentity, _message: &ServerMessage) -> bool {
        true
    }
}

impl<F> EventFilter for F
where
    F: Fn(&AuthorizedIdentity, &ServerMessage) -> bool + Send + Sync,
{
    fn accepts(&self, identity: &AuthorizedIdentity, message: &ServerMessage) -> bool {
        self(identity, message)
    }
}

/// What to do with a subscriber whose outbound buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlowConsumerPolicy {
    /// Drop this frame for that subscriber only
    #[default]
    Drop,
    /// Drop the frame and disconnect the subscriber
    Disconnect,
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub filtered: usize,
    pub dropped: usize,
    pub pruned: usize,
}

/// Fans change events out to the subscriber registry
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    filter: Arc<dyn EventFilter>,
    slow_consumers: SlowConsumerPolicy,
    count_rx: watch::Receiver<usize>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        let count_rx = registry.watch_count();
        Self {
            registry,
            filter: Arc::new(AllowAll),
            slow_consumers: SlowConsumerPolicy::default(),
            count_rx,
        }
    }

    pub fn with_filter(mut self, filter: impl EventFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_slow_consumer_policy(mut self, policy: SlowConsumerPolicy) -> Self {
        self.slow_consumers = policy;
        self
    }

    /// Serialize once and push to every eligible subscriber
    pub fn dispatch(&self, message: &ServerMessage) -> DispatchReport {
        let mut report = DispatchReport::default();

        let frame: Frame = match message.to_frame() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(error = %e, kind = message.kind(), "failed to serialize message");
                return report;
            }
        };

        for subscriber in self.registry.snapshot() {
            if !self.filter.accepts(subscriber.identity(), message) {
                report.filtered += 1;
                continue;
            }

            match subscriber.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Full) => {
                    report.dropped += 1;
                    if self.slow_consumers == SlowConsumerPolicy::Disconnect {
                        debug!(connection_id = %subscriber.id(), "disconnecting slow subscriber");
                        if self.registry.remove(&subscriber.id()) {
                            report.pruned += 1;
                        }
                    } else {
                        debug!(connection_id = %subscriber.id(), "outbound buffer full, frame dropped");
                    }
                }
                Err(DeliveryError::Closed) => {
                    debug!(connection_id = %subscriber.id(), "pruning closed subscriber");
                    if self.registry.remove(&subscriber.id()) {
                        report.pruned += 1;
                    }
                }
            }
        }

        trace!(
            kind = message.kind(),
            delivered = report.delivered,
            filtered = report.filtered,
            dropped = report.dropped,
            pruned = report.pruned,
            "dispatch complete"
        );
        report
    }

    /// Send the latest subscriber count if it changed since the last send
    pub fn dispatch_pending_count(&mut self) -> Option<DispatchReport> {
        if !self.count_rx.has_changed().unwrap_or(false) {
            return None;
        }
        let count = *self.count_rx.borrow_and_update();
        Some(self.dispatch(&ServerMessage::ClientCount { count }))
    }

    /// Consume `source` until it ends
    pub async fn run<S: ChangeSource>(mut self, mut source: S) {
        info!("broadcaster started");
        loop {
            tokio::select! {
                biased;

                event = source.next_event() => match event {
                    Some(event) => {
                        self.dispatch(&ServerMessage::from(event));
                    }
                    None => break,
                },

                changed = self.count_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let count = *self.count_rx.borrow_and_update();
                    self.dispatch(&ServerMessage::ClientCount { count });
                }
            }
        }
        info!("change source closed, broadcaster stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Subscriber;
    use crate::store::change_channel;
    use crate::types::{ChangeEvent, NewOrder, Order, Role};
    use chrono::Utc;
    use tokio::sync::mpsc;

    fn identity(name: &str, role: Role) -> AuthorizedIdentity {
        AuthorizedIdentity {
            user_id: format!("{}-id", name),
            username: name.to_string(),
            role,
        }
    }

    fn order(id: &str) -> Order {
        Order::from_new(
            id.to_string(),
            NewOrder {
                customer_name: "A".to_string(),
                customer_email: "a@x.com".to_string(),
                product_name: "Widget".to_string(),
                product_sku: format!("SKU-{}", id),
                amount: "9.99".to_string(),
                status: None,
            },
            Utc::now(),
        )
    }

    fn join(
        registry: &SubscriberRegistry,
        name: &str,
        capacity: usize,
    ) -> (Arc<Subscriber>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let sub = registry.add(Subscriber::new(identity(name, Role::Viewer), tx));
        (sub, rx)
    }

    fn order_ids(rx: &mut mpsc::Receiver<Frame>) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let msg: ServerMessage = serde_json::from_str(&frame).unwrap();
            if let ServerMessage::OrderChange(payload) = msg {
                ids.push(payload.data.id);
            }
        }
        ids
    }

    #[test]
    fn test_every_subscriber_gets_every_event_in_order() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut receivers: Vec<_> = (0..4)
            .map(|i| join(&registry, &format!("s{}", i), 64).1)
            .collect();
        let broadcaster = Broadcaster::new(registry.clone());

        let expected: Vec<String> = (0..10).map(|i| format!("o{}", i)).collect();
        for id in &expected {
            let report = broadcaster.dispatch(&ChangeEvent::Created { entity: order(id) }.into());
            assert_eq!(report.delivered, 4);
        }

        for rx in receivers.iter_mut() {
            assert_eq!(order_ids(rx), expected);
        }
    }

    #[test]
    fn test_failed_subscriber_pruned_without_blocking_others() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (_a, mut rx_a) = join(&registry, "a", 8);
        let (b, rx_b) = join(&registry, "b", 8);
        let (_c, mut rx_c) = join(&registry, "c", 8);
        drop(rx_b);

        let broadcaster = Broadcaster::new(registry.clone());
        let report = broadcaster.dispatch(&ChangeEvent::Created { entity: order("o1") }.into());

        assert_eq!(report.delivered, 2);
        assert_eq!(report.pruned, 1);
        assert!(!registry.contains(&b.id()));
        assert_eq!(order_ids(&mut rx_a), vec!["o1"]);
        assert_eq!(order_ids(&mut rx_c), vec!["o1"]);
    }

    #[test]
    fn test_full_buffer_drops_frame_but_keeps_subscriber() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (slow, mut rx_slow) = join(&registry, "slow", 1);
        let (_fast, mut rx_fast) = join(&registry, "fast", 8);
        let broadcaster = Broadcaster::new(registry.clone());

        broadcaster.dispatch(&ChangeEvent::Created { entity: order("o1") }.into());
        let report = broadcaster.dispatch(&ChangeEvent::Created { entity: order("o2") }.into());

        assert_eq!(report.dropped, 1);
        assert!(registry.contains(&slow.id()));
        assert_eq!(order_ids(&mut rx_slow), vec!["o1"]);
        assert_eq!(order_ids(&mut rx_fast), vec!["o1", "o2"]);
    }

    #[test]
    fn test_disconnect_policy_evicts_slow_subscriber() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (slow, _rx_slow) = join(&registry, "slow", 1);
        let broadcaster = Broadcaster::new(registry.clone())
            .with_slow_consumer_policy(SlowConsumerPolicy::Disconnect);

        broadcaster.dispatch(&ChangeEvent::Created { entity: order("o1") }.into());
        let report = broadcaster.dispatch(&ChangeEvent::Created { entity: order("o2") }.into());

        assert_eq!(report.pruned, 1);
        assert!(!registry.contains(&slow.id()));
    }

    #[test]
    fn test_filter_scopes_delivery() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (tx_admin, mut rx_admin) = mpsc::channel(8);
        registry.add(Subscriber::new(identity("root", Role::Admin), tx_admin));
        let (_viewer, mut rx_viewer) = join(&registry, "v", 8);

        let broadcaster = Broadcaster::new(registry.clone())
            .with_filter(|who: &AuthorizedIdentity, _msg: &ServerMessage| who.role == Role::Admin);
        let report = broadcaster.dispatch(&ChangeEvent::Deleted { previous: order("o1") }.into());

        assert_eq!(report.delivered, 1);
        assert_eq!(report.filtered, 1);
        assert_eq!(order_ids(&mut rx_admin), vec!["o1"]);
        assert!(order_ids(&mut rx_viewer).is_empty());
    }

    #[test]
    fn test_count_updates_coalesce_to_latest() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut broadcaster = Broadcaster::new(registry.clone());
        assert!(broadcaster.dispatch_pending_count().is_none());

        let (_a, mut rx_a) = join(&registry, "a", 8);
        let (b, _rx_b) = join(&registry, "b", 8);
        let (_c, _rx_c) = join(&registry, "c", 8);
        registry.remove(&b.id());

        broadcaster.dispatch_pending_count().unwrap();
        assert!(broadcaster.dispatch_pending_count().is_none());

        let frames: Vec<ServerMessage> = std::iter::from_fn(|| rx_a.try_recv().ok())
            .map(|f| serde_json::from_str(&f).unwrap())
            .collect();
        assert_eq!(frames, vec![ServerMessage::ClientCount { count: 2 }]);
    }

    #[tokio::test]
    async fn test_run_delivers_until_source_ends() {
        let registry = Arc::new(SubscriberRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let (_sub, mut rx) = join(&registry, "a", 64);

        let (sink, source) = change_channel();
        for id in ["o1", "o2", "o3"] {
            sink.emit(ChangeEvent::Created { entity: order(id) }).unwrap();
        }
        drop(sink);

        broadcaster.run(source).await;

        let frames: Vec<ServerMessage> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|f| serde_json::from_str(&f).unwrap())
            .collect();
        let ids: Vec<String> = frames
            .iter()
            .filter_map(|m| match m {
                ServerMessage::OrderChange(p) => Some(p.data.id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["o1", "o2", "o3"]);
    }
}

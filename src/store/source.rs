//! Change notification channel between the store and the broadcaster

use std::future::Future;

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::SourceGapError;
use crate::types::ChangeEvent;

/// A lazy, unbounded sequence of committed changes in commit order.
///
/// `next_event` must be cancel-safe: the broadcaster races it against other
/// inputs and may drop the future before it resolves. `None` means the source
/// has shut down for good.
pub trait ChangeSource: Send {
    fn next_event(&mut self) -> impl Future<Output = Option<ChangeEvent>> + Send;
}

/// Producer half, held by the store
#[derive(Clone, Debug)]
pub struct ChangeSink {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChangeSink {
    /// Publish a committed change. A missing consumer is a gap, not a write failure.
    pub fn emit(&self, event: ChangeEvent) -> Result<(), SourceGapError> {
        self.tx.send(event).map_err(|e| {
            let gap = SourceGapError(format!(
                "{} for order {} has no listener",
                e.0.operation(),
                e.0.order_id()
            ));
            warn!(error = %gap, "change event lost");
            gap
        })
    }
}

/// Consumer half backed by a tokio mpsc channel
#[derive(Debug)]
pub struct ChannelChangeSource {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeSource for ChannelChangeSource {
    async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

/// Create a connected sink/source pair
pub fn change_channel() -> (ChangeSink, ChannelChangeSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChangeSink { tx }, ChannelChangeSource { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewOrder, Order};
    use chrono::Utc;

    fn order(id: &str) -> Order {
        Order::from_new(
            id.to_string(),
            NewOrder {
                customer_name: "A".to_string(),
                customer_email: "a@x.com".to_string(),
                product_name: "Widget".to_string(),
                product_sku: "W-1".to_string(),
                amount: "1.00".to_string(),
                status: None,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_events_arrive_in_emit_order() {
        let (sink, mut source) = change_channel();
        for id in ["a", "b", "c"] {
            sink.emit(ChangeEvent::Created { entity: order(id) }).unwrap();
        }

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(source.next_event().await.unwrap().order_id().to_string());
        }
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_emit_without_listener_reports_gap() {
        let (sink, source) = change_channel();
        drop(source);
        let result = sink.emit(ChangeEvent::Deleted { previous: order("x") });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_source_ends_when_all_sinks_dropped() {
        let (sink, mut source) = change_channel();
        drop(sink);
        assert!(source.next_event().await.is_none());
    }
}

//! Registry of live subscriber connections
//!
//! The registry is the only state mutated by several logical callers: socket
//! tasks add and remove themselves while the broadcaster prunes dead entries.
//! A single mutex guards the member map and is never held across an await.
//! Every membership change publishes the new size on a `watch` channel, which
//! coalesces bursts into the latest value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::info;
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::types::AuthorizedIdentity;

/// A serialized frame shared by every recipient of one dispatch
pub type Frame = Arc<str>;

/// Opaque connection identifier generated at admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One admitted connection.
///
/// The outbound sender is the subscriber's transport handle: the socket task
/// drains the other end. Dropping the entry closes the channel, which is the
/// only teardown signal the socket task needs.
#[derive(Debug)]
pub struct Subscriber {
    id: ConnectionId,
    identity: AuthorizedIdentity,
    transport: mpsc::Sender<Frame>,
    open: AtomicBool,
}

impl Subscriber {
    pub fn new(identity: AuthorizedIdentity, transport: mpsc::Sender<Frame>) -> Self {
        Self {
            id: ConnectionId::new(),
            identity,
            transport,
            open: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &AuthorizedIdentity {
        &self.identity
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.transport.is_closed()
    }

    /// Flag the transport as gone; the next dispatch prunes the entry
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Non-blocking send of one frame
    pub fn send(&self, frame: Frame) -> Result<(), DeliveryError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }
        self.transport.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => {
                self.mark_closed();
                DeliveryError::Closed
            }
        })
    }
}

/// Thread-safe set of live subscribers keyed by connection id
pub struct SubscriberRegistry {
    members: Mutex<HashMap<ConnectionId, Arc<Subscriber>>>,
    count_tx: watch::Sender<usize>,
    admitted: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            members: Mutex::new(HashMap::new()),
            count_tx,
            admitted: AtomicU64::new(0),
        }
    }

    /// Insert an admitted subscriber
    pub fn add(&self, subscriber: Subscriber) -> Arc<Subscriber> {
        let subscriber = Arc::new(subscriber);
        let count = {
            let mut members = self.members.lock();
            members.insert(subscriber.id(), subscriber.clone());
            let count = members.len();
            self.count_tx.send_replace(count);
            count
        };
        self.admitted.fetch_add(1, Ordering::Relaxed);

        info!(
            connection_id = %subscriber.id(),
            user = %subscriber.identity().username,
            count,
            "subscriber admitted"
        );
        subscriber
    }

    /// Remove a subscriber; absent ids are a no-op. Returns whether it was present.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut members = self.members.lock();
            let removed = members.remove(id);
            if removed.is_some() {
                self.count_tx.send_replace(members.len());
            }
            removed
        };

        match removed {
            Some(subscriber) => {
                subscriber.mark_closed();
                info!(connection_id = %id, count = self.count(), "subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Consistent copy of the member set taken under the lock
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.members.lock().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.members.lock().len()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.lock().contains_key(id)
    }

    /// Receiver of the latest membership size
    pub fn watch_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Number of successful `add` calls since creation
    pub fn total_admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Reconnecting subscriber session

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::transport::{Connector, Transport};
use crate::types::{OrderChangePayload, RawEnvelope, CLIENT_COUNT, ORDER_CHANGE};

/// Connection lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Delay between a failure and the next connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Same delay after every failure
    Fixed(Duration),
    /// Doubles per consecutive failure up to `max`; resets once connected
    Exponential { initial: Duration, max: Duration },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed(Duration::from_secs(3))
    }
}

impl BackoffPolicy {
    /// Delay after `failures` consecutive failures (0 for the first)
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            BackoffPolicy::Fixed(delay) => delay,
            BackoffPolicy::Exponential { initial, max } => initial
                .checked_mul(1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX))
                .unwrap_or(max)
                .min(max),
        }
    }
}

/// Session proof sent on the upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Cookie name and value
    Cookie(String, String),
    Bearer(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub credential: Option<Credential>,
    pub backoff: BackoffPolicy,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credential: None,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

type Handler = Box<dyn Fn(Value) + Send + Sync>;

#[derive(Deserialize)]
struct CountData {
    count: usize,
}

/// A subscriber session not yet started
pub struct ConnectionSession<C: Connector> {
    config: SessionConfig,
    connector: C,
    handlers: HashMap<String, Handler>,
}

impl<C: Connector> ConnectionSession<C> {
    pub fn new(config: SessionConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for envelopes of type `kind`, replacing any previous one
    pub fn on(mut self, kind: impl Into<String>, handler: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.handlers.insert(kind.into(), Box::new(handler));
        self
    }

    pub fn on_order_change(
        self,
        handler: impl Fn(OrderChangePayload) + Send + Sync + 'static,
    ) -> Self {
        self.on(ORDER_CHANGE, move |data| {
            match serde_json::from_value::<OrderChangePayload>(data) {
                Ok(payload) => handler(payload),
                Err(e) => debug!(error = %e, "malformed order_change payload"),
            }
        })
    }

    pub fn on_client_count(self, handler: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on(CLIENT_COUNT, move |data| {
            match serde_json::from_value::<CountData>(data) {
                Ok(data) => handler(data.count),
                Err(e) => debug!(error = %e, "malformed client_count payload"),
            }
        })
    }

    /// Start the session on the current runtime
    pub fn spawn(self) -> SessionHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let attempts = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(self.run(shutdown_rx, state_tx, attempts.clone()));

        SessionHandle {
            shutdown: shutdown_tx,
            state: state_rx,
            attempts,
            task,
        }
    }

    fn route(&self, text: &str) {
        let envelope: RawEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "dropping malformed frame");
                return;
            }
        };
        match self.handlers.get(&envelope.kind) {
            Some(handler) => handler(envelope.data),
            None => debug!(kind = %envelope.kind, "no handler for message type"),
        }
    }

    // The transport and the backoff sleep are both locals of this one task,
    // so there is never more than one of each.
    async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        state: watch::Sender<SessionState>,
        attempts: Arc<AtomicU64>,
    ) {
        let set_state = |next: SessionState| {
            let prev = state.send_replace(next);
            if prev != next {
                info!(url = %self.config.url, from = ?prev, to = ?next, "session state");
            }
        };

        let mut failures: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            set_state(SessionState::Connecting);
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;

            let connected = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                result = self.connector.connect(&self.config) => result,
            };

            match connected {
                Ok(mut transport) => {
                    failures = 0;
                    set_state(SessionState::Connected);

                    let stopping = loop {
                        tokio::select! {
                            biased;
                            _ = shutdown.changed() => break true,
                            frame = transport.recv() => match frame {
                                Some(Ok(text)) => self.route(&text),
                                Some(Err(e)) => {
                                    warn!(error = %e, "connection lost");
                                    break false;
                                }
                                None => {
                                    info!("connection closed by server");
                                    break false;
                                }
                            },
                        }
                    };

                    transport.close().await;
                    drop(transport);
                    set_state(SessionState::Disconnected);
                    if stopping {
                        break;
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "connect failed");
                    set_state(SessionState::Disconnected);
                }
            }

            let delay = self.config.backoff.delay(failures);
            failures = failures.saturating_add(1);
            debug!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        set_state(SessionState::Disconnected);
        info!(url = %self.config.url, "session stopped");
    }
}

/// Control handle of a running session.
///
/// Dropping the handle also stops the session.
pub struct SessionHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<SessionState>,
    attempts: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Connect attempts made so far
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Cancel any pending backoff, close the transport and wait for the task
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        let _ = self.task.await;
    }
}

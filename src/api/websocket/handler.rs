//! WebSocket connection handler

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use super::state::AppState;
use crate::auth::is_same_origin;
use crate::registry::{Frame, Subscriber};
use crate::types::{AuthorizedIdentity, ClientMessage, PongMessage};

/// WebSocket upgrade handler.
///
/// The gate runs before the upgrade is accepted, so a refused request gets a
/// plain HTTP status and never reaches the registry.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !is_same_origin(&headers) {
        debug!("upgrade refused: cross-origin request");
        return StatusCode::FORBIDDEN.into_response();
    }

    let identity = match state.gate.admit(&headers).await {
        Ok(identity) => identity,
        Err(e) => {
            debug!(error = %e, "upgrade refused");
            return StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::UNAUTHORIZED)
                .into_response();
        }
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state, identity)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Drive one admitted connection until either side goes away
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: AuthorizedIdentity) {
    let (tx, mut rx) = mpsc::channel::<Frame>(state.config.subscriber_buffer);
    // Only the registry holds the subscriber; removal closes `rx`.
    let id = state.registry.add(Subscriber::new(identity, tx)).id();

    let (mut sink, mut stream) = socket.split();

    let every = state.config.heartbeat_interval;
    let mut heartbeat = time::interval_at(Instant::now() + every, every);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if !send_within(&mut sink, Message::Text(frame.to_string()), every).await {
                            debug!(connection_id = %id, "write failed or stalled, closing");
                            break;
                        }
                    }
                    // Evicted by the broadcaster
                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > every * 2 {
                    debug!(connection_id = %id, "no traffic within two heartbeats, closing");
                    break;
                }
                if !send_within(&mut sink, Message::Ping(Vec::new()), every).await {
                    break;
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(msg)) => {
                        last_seen = Instant::now();
                        match classify(msg) {
                            Inbound::Reply(reply) => {
                                if !send_within(&mut sink, reply, every).await {
                                    break;
                                }
                            }
                            Inbound::Ignore => {}
                            Inbound::Close => break,
                        }
                    }
                    Some(Err(e)) => {
                        debug!(connection_id = %id, error = %e, "socket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.registry.remove(&id);
    let _ = time::timeout(every, sink.close()).await;
}

/// Write one message, giving up if the peer has not taken it within `limit`
async fn send_within<S>(sink: &mut S, msg: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
{
    matches!(time::timeout(limit, sink.send(msg)).await, Ok(Ok(())))
}

/// What to do with one message from the client
#[derive(Debug, PartialEq)]
enum Inbound {
    Reply(Message),
    Ignore,
    Close,
}

fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Ping) => match serde_json::to_string(&PongMessage::default()) {
                Ok(json) => Inbound::Reply(Message::Text(json)),
                Err(_) => Inbound::Ignore,
            },
            Err(_) => {
                debug!("ignoring unrecognised client message");
                Inbound::Ignore
            }
        },
        Message::Binary(_) => Inbound::Ignore,
        Message::Ping(data) => Inbound::Reply(Message::Pong(data)),
        Message::Pong(_) => Inbound::Ignore,
        Message::Close(_) => Inbound::Close,
    }
}

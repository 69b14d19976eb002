//! End-to-end tests for the order change stream
//!
//! Each test binds a real server on an ephemeral port and talks to it over
//! WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use order_stream::api::websocket::AppState;
use order_stream::client::{
    BackoffPolicy, ConnectionSession, Connector, Credential, SessionConfig, SessionState,
    Transport, WsConnector,
};
use order_stream::config::parse_users;
use order_stream::types::{NewOrder, Operation};
use order_stream::{App, ServerConfig};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _stop: oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    async fn start_with(config: ServerConfig) -> Self {
        let config = ServerConfig {
            users: parse_users("ada:pw:admin,vera:pw:viewer").unwrap(),
            bcrypt_cost: 4,
            ..config
        };
        let app = App::from_config(config).await.unwrap();
        let state = app.state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(app.serve(listener, async {
            let _ = stopped.await;
        }));

        Self {
            addr,
            state,
            _stop: stop,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    async fn token(&self, username: &str) -> String {
        let user = self.state.users.find_by_username(username).await.unwrap();
        self.state.auth.issue_token(&user).unwrap().token
    }

    async fn connect(&self, token: Option<&str>) -> Result<Socket, WsError> {
        let mut request = self.ws_url().into_client_request().unwrap();
        if let Some(token) = token {
            request.headers_mut().insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }
        connect_async(request).await.map(|(socket, _)| socket)
    }
}

fn widget() -> NewOrder {
    NewOrder {
        customer_name: "Jane Doe".to_string(),
        customer_email: "jane@example.com".to_string(),
        product_name: "Widget".to_string(),
        product_sku: "W-1".to_string(),
        amount: "19.99".to_string(),
        status: None,
    }
}

/// Next envelope of the given type, skipping others
async fn next_of_type(socket: &mut Socket, kind: &str) -> Value {
    timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    if value["type"] == kind {
                        return value;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    })
    .await
    .expect("timed out waiting for frame")
}

async fn wait_for_count(state: &AppState, expected: usize) {
    timeout(WAIT, async {
        while state.registry.count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry count never settled");
}

#[tokio::test]
async fn test_insert_then_delete_reaches_subscriber() {
    let server = TestServer::start().await;
    let token = server.token("vera").await;
    let mut socket = server.connect(Some(&token)).await.unwrap();
    wait_for_count(&server.state, 1).await;

    let order = server.state.orders.create_order(widget()).await.unwrap();
    server.state.orders.delete_order(&order.id).await.unwrap();

    let insert = next_of_type(&mut socket, "order_change").await;
    assert_eq!(insert["data"]["operation"], "INSERT");
    assert_eq!(insert["data"]["data"]["productSku"], "W-1");
    assert!(insert["data"].get("old_data").is_none());

    let delete = next_of_type(&mut socket, "order_change").await;
    assert_eq!(delete["data"]["operation"], "DELETE");
    assert_eq!(delete["data"]["data"]["id"], order.id.as_str());

    // nothing else follows
    let extra = timeout(Duration::from_millis(200), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) if text.contains("order_change") => return text,
                Some(Ok(_)) => continue,
                _ => futures::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn test_rejected_upgrades_never_register() {
    let server = TestServer::start().await;

    for _ in 0..5 {
        match server.connect(None).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            other => panic!("expected 401, got {:?}", other.map(|_| ())),
        }
    }
    match server.connect(Some("forged.token.value")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        other => panic!("expected 401, got {:?}", other.map(|_| ())),
    }

    assert_eq!(server.state.registry.count(), 0);
    assert_eq!(server.state.registry.total_admitted(), 0);
}

#[tokio::test]
async fn test_client_count_follows_membership() {
    let server = TestServer::start().await;
    let token = server.token("vera").await;

    let mut first = server.connect(Some(&token)).await.unwrap();
    let second = server.connect(Some(&token)).await.unwrap();
    wait_for_count(&server.state, 2).await;

    drop(second);
    wait_for_count(&server.state, 1).await;

    // the latest count always arrives; intermediate values may coalesce
    let count = timeout(WAIT, async {
        loop {
            let frame = next_of_type(&mut first, "client_count").await;
            if frame["data"]["count"] == 1 {
                return;
            }
        }
    })
    .await;
    assert!(count.is_ok());
}

#[tokio::test]
async fn test_ping_is_answered() {
    let server = TestServer::start().await;
    let token = server.token("ada").await;
    let mut socket = server.connect(Some(&token)).await.unwrap();

    socket
        .send(Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    let pong = next_of_type(&mut socket, "pong").await;
    assert_eq!(pong, serde_json::json!({"type": "pong"}));
}

#[tokio::test]
async fn test_session_receives_changes_and_shuts_down() {
    let server = TestServer::start().await;
    let token = server.token("vera").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = SessionConfig::new(server.ws_url())
        .with_credential(Credential::Cookie("order_session".to_string(), token))
        .with_backoff(BackoffPolicy::Fixed(Duration::from_millis(50)));
    let handle = ConnectionSession::new(config, WsConnector)
        .on_order_change(move |change| {
            let _ = tx.send(change);
        })
        .spawn();

    let mut state = handle.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == SessionState::Connected))
        .await
        .unwrap()
        .unwrap();
    wait_for_count(&server.state, 1).await;

    let order = server.state.orders.create_order(widget()).await.unwrap();
    let change = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(change.operation, Operation::Created);
    assert_eq!(change.data.id, order.id);

    handle.shutdown().await;
    wait_for_count(&server.state, 0).await;
}

#[tokio::test]
async fn test_session_retries_rejected_credential() {
    let server = TestServer::start().await;

    let config = SessionConfig::new(server.ws_url())
        .with_credential(Credential::Bearer("expired".to_string()))
        .with_backoff(BackoffPolicy::Fixed(Duration::from_millis(20)));
    let handle = ConnectionSession::new(config, WsConnector).spawn();

    timeout(WAIT, async {
        while handle.attempts() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_ne!(handle.state(), SessionState::Connected);
    assert_eq!(server.state.registry.total_admitted(), 0);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_silent_peer_is_dropped() {
    let server = TestServer::start_with(ServerConfig {
        heartbeat_interval: Duration::from_millis(100),
        ..ServerConfig::default()
    })
    .await;
    let token = server.token("vera").await;

    // Never polled, so it never answers a ping.
    let _socket = server.connect(Some(&token)).await.unwrap();
    wait_for_count(&server.state, 1).await;

    wait_for_count(&server.state, 0).await;
    assert_eq!(server.state.registry.total_admitted(), 1);
}

#[tokio::test]
async fn test_heartbeat_ping_arrives() {
    let server = TestServer::start_with(ServerConfig {
        heartbeat_interval: Duration::from_millis(100),
        ..ServerConfig::default()
    })
    .await;
    let token = server.token("vera").await;
    let mut socket = server.connect(Some(&token)).await.unwrap();

    let ping = timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Ping(_))) => return true,
                Some(Ok(_)) => continue,
                _ => return false,
            }
        }
    })
    .await
    .unwrap();
    assert!(ping);
}

#[tokio::test]
async fn test_clean_close_ends_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        socket
            .send(Message::Text(r#"{"type":"client_count","data":{"count":1}}"#.to_string()))
            .await
            .unwrap();
        socket.close(None).await.unwrap();
        // Drain until the client acknowledges the close.
        while let Some(Ok(_)) = socket.next().await {}
    });

    let config = SessionConfig::new(format!("ws://{}/ws", addr));
    let mut transport = WsConnector.connect(&config).await.unwrap();

    let first = timeout(WAIT, transport.recv()).await.unwrap();
    assert!(matches!(first, Some(Ok(ref text)) if text.contains("client_count")));
    assert!(timeout(WAIT, transport.recv()).await.unwrap().is_none());
}

//! Connection transports

use std::future::Future;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::trace;

use super::session::{Credential, SessionConfig};
use crate::error::SessionError;

/// Opens transports to the server
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<Self::Transport, SessionError>> + Send;
}

/// An open connection delivering text frames.
///
/// `recv` must be cancel-safe: the session drops it when shutting down.
pub trait Transport: Send + 'static {
    /// Next text frame; `None` once the peer has closed the connection
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, SessionError>>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// WebSocket connector over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, config: &SessionConfig) -> Result<WsTransport, SessionError> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::Connect(e.to_string()))?;

        if let Some(ref credential) = config.credential {
            let (name, value) = match credential {
                Credential::Cookie(name, value) => (header::COOKIE, format!("{}={}", name, value)),
                Credential::Bearer(token) => (header::AUTHORIZATION, format!("Bearer {}", token)),
            };
            let value =
                HeaderValue::from_str(&value).map_err(|e| SessionError::Connect(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        match connect_async(request).await {
            Ok((stream, _)) => Ok(WsTransport { stream }),
            Err(WsError::Http(response)) => Err(SessionError::Rejected(response.status().as_u16())),
            Err(e) => Err(SessionError::Connect(e.to_string())),
        }
    }
}

impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // tungstenite queues the pong itself
                Ok(Message::Ping(_)) => trace!("heartbeat ping"),
                Ok(_) => {}
                Err(WsError::ConnectionClosed) => return None,
                Err(e) => return Some(Err(SessionError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

//! Connection transport.
//!
//! The session layer talks to the network through these traits so it can be
//! driven by a scripted connection in tests. `TungsteniteConnector` is the
//! production implementation.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, SplitSink};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::config::DEFAULT_ORIGIN;
use super::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Inbound byte chunks; the stream ends when the peer closes.
pub type InboundStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one transport message.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Closes the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An open duplex connection.
pub struct Connection {
    /// Write half.
    pub sink: Box<dyn FrameSink>,
    /// Read half.
    pub stream: InboundStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection to `url`.
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    origin: String,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN)
    }
}

impl TungsteniteConnector {
    /// Creates a connector sending the given `Origin` header.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let origin =
            HeaderValue::from_str(&self.origin).map_err(|e| TransportError::Connect(e.to_string()))?;
        request.headers_mut().insert(ORIGIN, origin);

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url, "websocket connected");

        let (sink, source) = ws_stream.split();
        let stream = source
            .filter_map(|result| async move {
                match result {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().as_bytes().to_vec())),
                    Ok(Message::Binary(bytes)) => Some(Ok(bytes.to_vec())),
                    Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                    Ok(_) => None,
                    Err(err) => Some(Err(TransportError::from(err))),
                }
            })
            .boxed();

        Ok(Connection {
            sink: Box::new(TungsteniteSink { inner: sink }),
            stream,
        })
    }
}

struct TungsteniteSink {
    inner: WsSink,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

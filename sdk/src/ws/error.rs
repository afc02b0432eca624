//! WebSocket error types.
//!
//! Provides error types for the session, transport and subscription layers.

use std::fmt;

use crate::error::SdkError;

/// Transport level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not open the connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Could not write to the connection.
    #[error("send failed: {0}")]
    Send(String),

    /// Could not read from the connection.
    #[error("receive failed: {0}")]
    Receive(String),

    /// Connection is already closed.
    #[error("transport closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;

        match err {
            Error::ConnectionClosed | Error::AlreadyClosed => Self::Closed,
            other => Self::Receive(other.to_string()),
        }
    }
}

/// Handshake failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// No greeting arrived in time.
    #[error("no server greeting within {0:?}")]
    Timeout(std::time::Duration),

    /// The server reported an error before the session was ready.
    #[error("server rejected the session: {0}")]
    Rejected(String),

    /// The server speaks a payload protocol this client does not.
    #[error("unsupported server protocol: {0}")]
    ProtocolMismatch(String),

    /// The transport closed during the handshake.
    #[error("connection closed during handshake")]
    Closed,
}

impl HandshakeError {
    /// Returns true if retrying cannot help.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolMismatch(_))
    }
}

/// Subscription bookkeeping failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// The client has been closed.
    #[error("client is closed")]
    ClientClosed,

    /// The handle is not registered (already unsubscribed or foreign).
    #[error("unknown subscription handle {0}")]
    UnknownHandle(u64),

    /// The operation needs a chart subscription.
    #[error("subscription {0} is not a chart")]
    NotChart(u64),

    /// The control message could not be queued.
    #[error("failed to queue control message: {0}")]
    Send(String),
}

/// Error returned by a subscription handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Handler refused the update.
    #[error("handler failed: {0}")]
    Failed(String),

    /// Handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Channel handler is full or its receiver dropped.
    #[error("handler channel unavailable: {0}")]
    Channel(String),
}

/// WebSocket errors.
#[derive(Debug, Clone)]
pub enum WsError {
    /// Connection failed.
    Connection(String),

    /// Transport failed.
    Transport(TransportError),

    /// Handshake failed permanently.
    Handshake(HandshakeError),

    /// Subscription operation failed.
    Subscription(SubscriptionError),

    /// Invalid symbol or resolution.
    InvalidInput(SdkError),

    /// Reconnect attempts exhausted.
    ReconnectExhausted(u32),

    /// Already connected.
    AlreadyConnected,

    /// Connection closed.
    Closed,

    /// Invalid configuration.
    InvalidConfig(String),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "connection failed: {}", msg),
            Self::Transport(err) => write!(f, "transport error: {}", err),
            Self::Handshake(err) => write!(f, "handshake failed: {}", err),
            Self::Subscription(err) => write!(f, "subscription failed: {}", err),
            Self::InvalidInput(err) => write!(f, "invalid input: {}", err),
            Self::ReconnectExhausted(attempts) => {
                write!(f, "gave up after {} reconnect attempts", attempts)
            }
            Self::AlreadyConnected => write!(f, "already connected"),
            Self::Closed => write!(f, "connection closed"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for WsError {}

impl From<TransportError> for WsError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<HandshakeError> for WsError {
    fn from(err: HandshakeError) -> Self {
        Self::Handshake(err)
    }
}

impl From<SubscriptionError> for WsError {
    fn from(err: SubscriptionError) -> Self {
        Self::Subscription(err)
    }
}

impl From<SdkError> for WsError {
    fn from(err: SdkError) -> Self {
        Self::InvalidInput(err)
    }
}

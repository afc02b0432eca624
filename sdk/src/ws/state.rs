//! Connection state.

use std::fmt;

/// Lifecycle state of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected yet.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Transport open, waiting for the server greeting.
    Handshaking,
    /// Sessions created, data flowing.
    Ready,
    /// Waiting before the next connection attempt.
    Reconnecting,
    /// Terminal; the client cannot be reused.
    Closed,
}

impl ConnectionState {
    /// Returns true once the client has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true while data is flowing.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::Ready => write!(f, "ready"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Handshaking.to_string(), "handshaking");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_connection_state_predicates() {
        assert!(ConnectionState::Closed.is_closed());
        assert!(!ConnectionState::Reconnecting.is_closed());
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Connecting.is_ready());
    }
}

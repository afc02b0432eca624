//! Scripted in-memory transport for session tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::error::TransportError;
use super::transport::{Connection, Connector, FrameSink};
use crate::codec::{FrameBuffer, FrameCodec};
use crate::protocol::HEARTBEAT_PREFIX;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) const HELLO: &str = r#"{"session_id":"<0.1234.5>_test","timestamp":1700000000,"release":"test","studies_metadata_hash":"x","protocol":"json","auth_scheme_vsn":2}"#;

enum Script {
    Accept(Connection),
    Fail(TransportError),
}

/// Connector that hands out pre-scripted connections in order.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    script: Arc<Mutex<VecDeque<Script>>>,
    attempts: Arc<Mutex<usize>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Scripts the next connect to succeed and returns the server side of it.
    pub(crate) fn expect_connection(&self) -> MockServer {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connection = Connection {
            sink: Box::new(MockSink { tx: outbound_tx }),
            stream: UnboundedReceiverStream::new(inbound_rx).boxed(),
        };
        self.script
            .lock()
            .expect("script lock")
            .push_back(Script::Accept(connection));

        MockServer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            pending: VecDeque::new(),
        }
    }

    /// Scripts the next connect to succeed with a peer that never reads:
    /// every write blocks forever. Inbound frames still reach the client.
    pub(crate) fn expect_stalled_connection(&self) -> MockServer {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (_, outbound_rx) = mpsc::unbounded_channel();
        let connection = Connection {
            sink: Box::new(StalledSink),
            stream: UnboundedReceiverStream::new(inbound_rx).boxed(),
        };
        self.script
            .lock()
            .expect("script lock")
            .push_back(Script::Accept(connection));

        MockServer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            pending: VecDeque::new(),
        }
    }

    /// Scripts the next connect to fail.
    pub(crate) fn expect_failure(&self) {
        self.script
            .lock()
            .expect("script lock")
            .push_back(Script::Fail(TransportError::Connect("refused".to_string())));
    }

    /// Number of connect calls so far.
    pub(crate) fn attempts(&self) -> usize {
        *self.attempts.lock().expect("attempts lock")
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
        *self.attempts.lock().expect("attempts lock") += 1;
        let next = self.script.lock().expect("script lock").pop_front();
        match next {
            Some(Script::Accept(connection)) => Ok(connection),
            Some(Script::Fail(err)) => Err(err),
            None => Err(TransportError::Connect("no scripted connection".to_string())),
        }
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Sink whose writes never complete.
pub(crate) struct StalledSink;

#[async_trait]
impl FrameSink for StalledSink {
    async fn send(&mut self, _text: String) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Server side of a scripted connection.
pub(crate) struct MockServer {
    inbound: Option<mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<String>,
    pending: VecDeque<String>,
}

impl MockServer {
    /// Sends raw bytes to the client.
    pub(crate) fn send_raw(&self, bytes: &[u8]) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(bytes.to_vec()));
        }
    }

    /// Sends one framed payload to the client.
    pub(crate) fn send_frame(&self, payload: &str) {
        self.send_raw(FrameCodec::encode(payload).as_bytes());
    }

    /// Sends the server greeting.
    pub(crate) fn hello(&self) {
        self.send_frame(HELLO);
    }

    /// Ends the inbound stream, as if the peer closed the socket.
    pub(crate) fn disconnect(&mut self) {
        self.inbound = None;
    }

    /// Next transport message written by the client.
    pub(crate) async fn next_message(&mut self) -> String {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client closed the connection")
    }

    /// Next payload written by the client, across transport messages.
    pub(crate) async fn next_payload(&mut self) -> String {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return payload;
            }
            let message = self.next_message().await;
            let mut buffer = FrameBuffer::default();
            buffer.extend(message.as_bytes());
            while let Some(frame) = buffer.next_frame().expect("client sent a bad frame") {
                self.pending.push_back(frame.payload);
            }
        }
    }

    /// Next JSON call written by the client, skipping heartbeats.
    pub(crate) async fn next_call(&mut self) -> Value {
        loop {
            let payload = self.next_payload().await;
            if !payload.starts_with(HEARTBEAT_PREFIX) {
                return serde_json::from_str(&payload).expect("client sent invalid json");
            }
        }
    }

    /// Method names of the next `count` calls.
    pub(crate) async fn next_methods(&mut self, count: usize) -> Vec<String> {
        let mut methods = Vec::with_capacity(count);
        for _ in 0..count {
            methods.push(method(&self.next_call().await));
        }
        methods
    }

    /// Consumes the session-creation calls and returns the quote session id.
    pub(crate) async fn expect_session_create(&mut self) -> String {
        let auth = self.next_call().await;
        assert_eq!(method(&auth), "set_auth_token");
        assert_eq!(auth["p"][0], "unauthorized_user_token");

        let create = self.next_call().await;
        assert_eq!(method(&create), "quote_create_session");
        create["p"][0].as_str().expect("quote session").to_string()
    }

    /// Returns true if the client wrote nothing within `wait`.
    pub(crate) async fn is_silent(&mut self, wait: Duration) -> bool {
        self.pending.is_empty() && tokio::time::timeout(wait, self.outbound.recv()).await.is_err()
    }
}

/// Method name of a JSON call.
pub(crate) fn method(call: &Value) -> String {
    call["m"].as_str().unwrap_or_default().to_string()
}

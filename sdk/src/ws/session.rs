//! Session state machine.
//!
//! Owns the physical connection: connect, handshake, the receive loop, the
//! single writer, and the reconnect loop. Data messages are pushed onto the
//! message queue and routed to handlers by a separate task.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::WsConfig;
use super::error::{HandshakeError, SubscriptionError, TransportError, WsError};
use super::metrics::WsMetrics;
use super::queue::{MessageQueue, QueueReceiver, Received};
use super::registry::SubscriptionRegistry;
use super::state::ConnectionState;
use super::transport::{Connector, FrameSink, InboundStream};
use crate::codec::{FrameBuffer, FrameCodec};
use crate::protocol::{ErrorKind, ProtocolMessage, HEARTBEAT_PREFIX};

/// Pending heartbeat echoes per connection.
const PONG_CAPACITY: usize = 16;

/// Time a dropped connection's writer gets to flush before it is aborted.
const WRITER_GRACE: Duration = Duration::from_millis(500);

/// Callback for fatal errors raised after `connect()` returned.
pub type ErrorHandler = Arc<dyn Fn(&WsError) + Send + Sync>;

/// State guarded by the registry lock.
#[derive(Debug)]
pub(crate) struct Core {
    pub(crate) registry: SubscriptionRegistry,
    /// Outbound channel of the live connection, if any.
    pub(crate) writer: Option<mpsc::Sender<String>>,
}

/// State shared by the client facade and its tasks.
pub(crate) struct Shared {
    pub(crate) config: WsConfig,
    pub(crate) metrics: Arc<WsMetrics>,
    pub(crate) core: Mutex<Core>,
    connector: Arc<dyn Connector>,
    codec: FrameCodec,
    state_tx: watch::Sender<ConnectionState>,
    queue: MessageQueue,
    receiver: Mutex<Option<QueueReceiver>>,
    last_error: Mutex<Option<WsError>>,
    error_handler: Mutex<Option<ErrorHandler>>,
}

impl Shared {
    pub(crate) fn new(config: WsConfig, connector: Arc<dyn Connector>) -> Self {
        let (queue, receiver) = MessageQueue::new(config.queue_capacity);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let registry = SubscriptionRegistry::new(config.auth_token.clone(), config.chart_bar_count);

        Self {
            codec: FrameCodec::new(config.max_frame_len),
            metrics: Arc::new(WsMetrics::new()),
            core: Mutex::new(Core {
                registry,
                writer: None,
            }),
            connector,
            state_tx,
            queue,
            receiver: Mutex::new(Some(receiver)),
            last_error: Mutex::new(None),
            error_handler: Mutex::new(None),
            config,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) async fn last_error(&self) -> Option<WsError> {
        self.last_error.lock().await.clone()
    }

    pub(crate) async fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.lock().await = Some(handler);
    }

    /// Moves to `next` unless the client is already closed.
    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if current.is_closed() || *current == next {
                return false;
            }
            info!(from = %current, to = %next, "connection state changed");
            *current = next;
            true
        });
    }

    /// Flags the client closed without touching the registry.
    pub(crate) fn signal_close(&self) {
        self.state_tx.send_if_modified(|current| {
            if current.is_closed() {
                return false;
            }
            info!(from = %current, "connection closed");
            *current = ConnectionState::Closed;
            true
        });
    }

    /// Resolves once the client is closed.
    async fn closed(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(ConnectionState::is_closed).await;
    }

    /// Terminal transition: stops every task and forgets all subscriptions.
    pub(crate) async fn shutdown(&self) {
        self.signal_close();
        let mut core = self.core.lock().await;
        core.registry.clear();
        core.writer = None;
    }

    /// Records a fatal error, notifies the error handler, and shuts down.
    async fn fail(&self, err: WsError) {
        error!(error = %err, "fatal session error");
        *self.last_error.lock().await = Some(err.clone());

        let handler = self.error_handler.lock().await.clone();
        if let Some(handler) = handler {
            handler(&err);
        }

        self.shutdown().await;
    }
}

/// One established connection.
struct Live {
    stream: InboundStream,
    buffer: FrameBuffer,
    pong_tx: mpsc::Sender<String>,
    writer: JoinHandle<()>,
}

impl Live {
    /// Returns the next parseable message already in the buffer.
    fn next_message(&mut self, metrics: &WsMetrics) -> Option<ProtocolMessage> {
        loop {
            let discarded = self.buffer.discarded();
            match self.buffer.next_frame() {
                Ok(Some(frame)) => {
                    metrics.record_frame_received();
                    match ProtocolMessage::parse(&frame.payload) {
                        Ok(message) => return Some(message),
                        Err(err) => {
                            warn!(error = %err, "dropping unparsable payload");
                            metrics.record_protocol_error();
                        }
                    }
                }
                Ok(None) => return None,
                Err(err) => {
                    let skipped = self.buffer.discarded() - discarded;
                    warn!(error = %err, skipped, "frame error, resynchronizing");
                    metrics.record_frame_error(skipped);
                }
            }
        }
    }

    /// Releases the connection. The writer drains what is already queued
    /// unless the sink stays blocked past `WRITER_GRACE`.
    async fn finish(self) {
        let Self {
            stream,
            pong_tx,
            mut writer,
            ..
        } = self;
        drop(stream);
        drop(pong_tx);

        if writer.is_finished() {
            return;
        }
        if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
            debug!("writer still blocked, aborting");
            writer.abort();
        }
    }

    /// Queues a heartbeat echo ahead of other outbound traffic.
    fn pong(&self, counter: u64) {
        let frame = FrameCodec::encode(&format!("{}{}", HEARTBEAT_PREFIX, counter));
        if let Err(err) = self.pong_tx.try_send(frame) {
            warn!(counter, error = %err, "failed to queue pong");
        }
    }
}

/// Reads one chunk into the frame buffer.
async fn fill(stream: &mut InboundStream, buffer: &mut FrameBuffer) -> Result<(), TransportError> {
    match stream.next().await {
        Some(Ok(bytes)) => {
            buffer.extend(&bytes);
            Ok(())
        }
        Some(Err(err)) => Err(err),
        None => Err(TransportError::Closed),
    }
}

/// Serializes control messages and queues them for the writer as one
/// transport message.
///
/// Never waits: a full or closed outbound channel is an error, and the
/// caller leaves the message to the replay that follows the next reconnect.
pub(crate) fn send_control(
    writer: &mpsc::Sender<String>,
    messages: &[ProtocolMessage],
) -> Result<(), SubscriptionError> {
    let mut payloads = Vec::new();
    for message in messages {
        let calls = message
            .serialize()
            .map_err(|e| SubscriptionError::Send(e.to_string()))?;
        debug!(message = message.name(), calls = calls.len(), "queueing control message");
        payloads.extend(calls);
    }

    writer
        .try_send(FrameCodec::encode_batch(&payloads))
        .map_err(|err| match err {
            TrySendError::Full(_) => SubscriptionError::Send("outbound queue full".to_string()),
            TrySendError::Closed(_) => SubscriptionError::Send("connection closed".to_string()),
        })
}

/// Single writer for one connection. Pongs always go first.
async fn run_writer(
    mut sink: Box<dyn FrameSink>,
    mut pongs: mpsc::Receiver<String>,
    mut outbound: mpsc::Receiver<String>,
    metrics: Arc<WsMetrics>,
) {
    loop {
        let (text, is_pong) = tokio::select! {
            biased;
            Some(text) = pongs.recv() => (text, true),
            Some(text) = outbound.recv() => (text, false),
            else => break,
        };

        if let Err(err) = sink.send(text).await {
            warn!(error = %err, "write failed");
            return;
        }
        metrics.record_message_sent();
        if is_pong {
            metrics.record_pong();
        }
    }

    if let Err(err) = sink.close().await {
        debug!(error = %err, "close failed");
    }
}

/// Connects for the first time and starts the background tasks.
///
/// Handshake failures are retried up to `max_handshake_attempts`; a transport
/// failure is returned immediately.
pub(crate) async fn connect(shared: &Arc<Shared>) -> Result<(), WsError> {
    let mut allowed = false;
    shared.state_tx.send_if_modified(|current| {
        if *current == ConnectionState::Disconnected {
            *current = ConnectionState::Connecting;
            allowed = true;
            true
        } else {
            false
        }
    });
    if !allowed {
        return Err(if shared.state().is_closed() {
            WsError::Closed
        } else {
            WsError::AlreadyConnected
        });
    }

    if let Some(receiver) = shared.receiver.lock().await.take() {
        tokio::spawn(run_router(Arc::clone(shared), receiver));
    }

    let mut failures = 0u32;
    loop {
        match open(shared).await {
            Ok(live) => {
                tokio::spawn(run_session(Arc::clone(shared), live));
                return Ok(());
            }
            Err(WsError::Transport(err)) => {
                shared.set_state(ConnectionState::Disconnected);
                return Err(WsError::Connection(err.to_string()));
            }
            Err(WsError::Handshake(err)) if !err.is_fatal() => {
                failures += 1;
                if failures >= shared.config.max_handshake_attempts {
                    let err = WsError::Handshake(err);
                    shared.fail(err.clone()).await;
                    return Err(err);
                }
                warn!(error = %err, failures, "handshake failed, retrying");
                let delay = shared.config.backoff(failures - 1);
                tokio::select! {
                    biased;
                    _ = shared.closed() => return Err(WsError::Closed),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(WsError::Closed) => return Err(WsError::Closed),
            Err(err) => {
                shared.fail(err.clone()).await;
                return Err(err);
            }
        }
    }
}

/// Opens the transport, waits for the greeting, and replays subscriptions.
async fn open(shared: &Arc<Shared>) -> Result<Live, WsError> {
    shared.set_state(ConnectionState::Connecting);

    let connection = tokio::select! {
        biased;
        _ = shared.closed() => return Err(WsError::Closed),
        result = shared.connector.connect(&shared.config.url) => result?,
    };

    shared.set_state(ConnectionState::Handshaking);

    let (out_tx, out_rx) = mpsc::channel(shared.config.outbound_capacity);
    let (pong_tx, pong_rx) = mpsc::channel(PONG_CAPACITY);
    let writer = tokio::spawn(run_writer(
        connection.sink,
        pong_rx,
        out_rx,
        Arc::clone(&shared.metrics),
    ));

    let mut live = Live {
        stream: connection.stream,
        buffer: FrameBuffer::new(shared.codec),
        pong_tx,
        writer,
    };

    let timeout = shared.config.handshake_timeout;
    tokio::select! {
        biased;
        _ = shared.closed() => return Err(WsError::Closed),
        result = tokio::time::timeout(timeout, await_hello(shared, &mut live)) => match result {
            Ok(result) => result?,
            Err(_) => return Err(HandshakeError::Timeout(timeout).into()),
        },
    }

    let mut core = shared.core.lock().await;
    if shared.state().is_closed() {
        return Err(WsError::Closed);
    }

    let replay = core.registry.replay();
    if let Err(err) = send_control(&out_tx, &replay) {
        warn!(error = %err, "failed to replay subscriptions");
    }
    core.writer = Some(out_tx);
    shared.set_state(ConnectionState::Ready);
    drop(core);

    shared.metrics.record_connection();
    Ok(live)
}

/// Reads until the server greeting arrives.
async fn await_hello(shared: &Shared, live: &mut Live) -> Result<(), HandshakeError> {
    loop {
        while let Some(message) = live.next_message(&shared.metrics) {
            match message {
                ProtocolMessage::SessionHello {
                    session_id,
                    protocol,
                    release,
                } => {
                    if let Some(protocol) = protocol.filter(|p| p.as_str() != "json") {
                        return Err(HandshakeError::ProtocolMismatch(protocol));
                    }
                    info!(%session_id, ?release, "server greeting received");
                    return Ok(());
                }
                ProtocolMessage::Ping(counter) => live.pong(counter),
                ProtocolMessage::Error {
                    kind: ErrorKind::Critical,
                    message,
                    ..
                } => return Err(HandshakeError::Rejected(message)),
                other => debug!(message = other.name(), "ignoring message before greeting"),
            }
        }

        fill(&mut live.stream, &mut live.buffer)
            .await
            .map_err(|_| HandshakeError::Closed)?;
    }
}

enum Exit {
    Closed,
    Lost(String),
}

/// Receive loop for one ready connection.
async fn receive(shared: &Shared, live: &mut Live) -> Exit {
    let idle_timeout = shared.config.idle_timeout;
    loop {
        while let Some(message) = live.next_message(&shared.metrics) {
            if let Some(reason) = handle_inbound(shared, live, message) {
                return Exit::Lost(reason);
            }
        }

        tokio::select! {
            biased;
            _ = shared.closed() => return Exit::Closed,
            _ = &mut live.writer => return Exit::Lost("writer stopped".to_string()),
            result = tokio::time::timeout(idle_timeout, fill(&mut live.stream, &mut live.buffer)) => {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => return Exit::Lost(err.to_string()),
                    Err(_) => return Exit::Lost(format!("no data for {:?}", idle_timeout)),
                }
            }
        }
    }
}

/// Handles one inbound message; returns a reason if the connection must be dropped.
fn handle_inbound(shared: &Shared, live: &Live, message: ProtocolMessage) -> Option<String> {
    match message {
        ProtocolMessage::Ping(counter) => {
            debug!(counter, "heartbeat");
            live.pong(counter);
        }
        ProtocolMessage::SessionHello { session_id, .. } => {
            debug!(%session_id, "ignoring repeated greeting");
        }
        ProtocolMessage::Error {
            kind: ErrorKind::Protocol,
            message,
            ..
        } => {
            warn!(%message, "server reported a protocol error");
        }
        ProtocolMessage::Error {
            kind: ErrorKind::Critical,
            session: None,
            message,
        } => {
            return Some(format!("critical error: {}", message));
        }
        ProtocolMessage::Unknown { method, .. } => {
            debug!(?method, "ignoring unknown message");
        }
        message if message.is_data() || matches!(message, ProtocolMessage::Error { .. }) => {
            if !shared.queue.push(message) {
                debug!("message queue has no consumer");
            }
        }
        other => debug!(message = other.name(), "ignoring outbound-only message"),
    }
    None
}

/// Session task: receive loop plus the reconnect loop.
async fn run_session(shared: Arc<Shared>, live: Live) {
    let mut live = live;
    loop {
        let exit = receive(&shared, &mut live).await;
        shared.core.lock().await.writer = None;
        live.finish().await;

        match exit {
            Exit::Closed => {
                info!("session stopped");
                return;
            }
            Exit::Lost(reason) => warn!(%reason, "connection lost"),
        }

        match reconnect(&shared).await {
            Ok(next) => live = next,
            Err(WsError::Closed) => return,
            Err(err) => {
                shared.fail(err).await;
                return;
            }
        }
    }
}

/// Reconnects with capped exponential backoff.
///
/// A connection that drops or stays silent before the greeting is a
/// transport failure and only counts toward `max_reconnect_attempts`.
/// Repeated rejections and a protocol mismatch are fatal.
async fn reconnect(shared: &Arc<Shared>) -> Result<Live, WsError> {
    let mut attempt = 0u32;
    let mut rejections = 0u32;

    loop {
        if let Some(max) = shared.config.max_reconnect_attempts {
            if attempt >= max {
                return Err(WsError::ReconnectExhausted(attempt));
            }
        }

        shared.set_state(ConnectionState::Reconnecting);
        let delay = shared.config.backoff(attempt);
        info!(attempt = attempt + 1, ?delay, "reconnecting");

        tokio::select! {
            biased;
            _ = shared.closed() => return Err(WsError::Closed),
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
        shared.metrics.record_reconnect();

        match open(shared).await {
            Ok(live) => return Ok(live),
            Err(WsError::Handshake(err)) if err.is_fatal() => return Err(err.into()),
            Err(WsError::Handshake(err @ HandshakeError::Rejected(_))) => {
                rejections += 1;
                if rejections >= shared.config.max_handshake_attempts {
                    return Err(err.into());
                }
                warn!(error = %err, rejections, "handshake rejected");
            }
            Err(WsError::Closed) => return Err(WsError::Closed),
            Err(err) => warn!(error = %err, attempt, "reconnect attempt failed"),
        }
    }
}

/// Router task: drains the queue and invokes handlers outside the lock.
async fn run_router(shared: Arc<Shared>, mut receiver: QueueReceiver) {
    loop {
        let item = tokio::select! {
            biased;
            _ = shared.closed() => break,
            item = receiver.recv() => item,
        };

        match item {
            Some(Received::Message(message)) => dispatch(&shared, &message).await,
            Some(Received::Lagged(skipped)) => {
                warn!(skipped, "router fell behind, dropped oldest messages");
                shared.metrics.record_dropped(skipped);
            }
            None => break,
        }
    }
    debug!("router stopped");
}

async fn dispatch(shared: &Shared, message: &ProtocolMessage) {
    let deliveries = shared.core.lock().await.registry.route(message);

    let Some(deliveries) = deliveries else {
        debug!(message = message.name(), "dropping message with no subscriber");
        shared.metrics.record_unrouted();
        return;
    };

    for delivery in deliveries {
        match delivery.handler.call(&delivery.update) {
            Ok(()) => shared.metrics.record_delivered(),
            Err(err) => {
                warn!(
                    key = %delivery.handle.key(),
                    id = delivery.handle.id(),
                    error = %err,
                    "handler failed"
                );
                shared.metrics.record_handler_failure();
            }
        }
    }
}

//! Main streamer service.
//!
//! Subscribes every configured stream and writes each update as one JSON
//! line until stopped.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};
use tvfeed_sdk::client::SymbolSearchClient;
use tvfeed_sdk::ws::{WsMetrics, WsMetricsSnapshot};
use tvfeed_sdk::{
    ClientError, Handler, MarketUpdate, SubscriptionHandle, SymbolMatch, TradingViewClient,
    WsError,
};

use super::config::{ConfigError, StreamerConfig};

/// Streamer errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// WebSocket client failure.
    #[error(transparent)]
    Ws(#[from] WsError),

    /// Symbol search failure.
    #[error(transparent)]
    Search(#[from] ClientError),

    /// Output could not be written.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// Update could not be serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The streamer service.
pub struct StreamerService {
    /// Configuration.
    config: StreamerConfig,

    /// Market data client.
    client: TradingViewClient,

    /// Whether the service is running.
    running: Arc<AtomicBool>,

    /// Wakes the run loop on stop.
    shutdown: Arc<Notify>,
}

impl StreamerService {
    /// Creates a new streamer service.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: StreamerConfig) -> Result<Self, StreamerError> {
        config.validate()?;
        let client = TradingViewClient::new(config.ws_config())?;
        Ok(Self::with_client(config, client))
    }

    /// Creates a service around an existing client.
    #[must_use]
    pub fn with_client(config: StreamerConfig, client: TradingViewClient) -> Self {
        Self {
            config,
            client,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Returns the client metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<WsMetrics> {
        self.client.metrics()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Returns true if the service is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stops the service.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.shutdown.notify_one();
        info!("Streamer stop requested");
    }

    /// Runs the configured symbol search, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the search request fails.
    pub async fn search(
        &self,
        search: &SymbolSearchClient,
    ) -> Result<Vec<SymbolMatch>, StreamerError> {
        let Some(text) = self.config.search.as_deref() else {
            return Ok(Vec::new());
        };

        let found = search
            .search(text, self.config.search_exchange.as_deref())
            .await?;
        info!(text, matches = found.len(), "Symbol search finished");
        Ok(found)
    }

    /// Subscribes every configured quote and chart stream, forwarding
    /// updates into `tx`.
    ///
    /// # Errors
    ///
    /// Returns an error if any subscription is rejected.
    pub async fn subscribe_all(
        &self,
        tx: &mpsc::Sender<MarketUpdate>,
    ) -> Result<Vec<SubscriptionHandle>, StreamerError> {
        let fields: Vec<&str> = self.config.quote_fields.iter().map(String::as_str).collect();
        let mut handles = Vec::with_capacity(self.config.quotes.len() + self.config.charts.len());

        for symbol in &self.config.quotes {
            let handle = self
                .client
                .subscribe_quote(symbol, &fields, Handler::channel(tx.clone()))
                .await?;
            debug!(%symbol, "Quote stream subscribed");
            handles.push(handle);
        }

        for chart in &self.config.charts {
            let handle = self
                .client
                .subscribe_chart(
                    &chart.symbol,
                    chart.resolution.clone(),
                    Handler::channel(tx.clone()),
                )
                .await?;
            debug!(symbol = %chart.symbol, resolution = %chart.resolution, "Chart stream subscribed");
            handles.push(handle);
        }

        Ok(handles)
    }

    /// Runs the service, printing updates to stdout.
    ///
    /// Returns the number of updates written.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting fails or the client gives up.
    pub async fn run(&self) -> Result<u64, StreamerError> {
        let mut stdout = std::io::stdout();
        self.run_with_output(&mut stdout).await
    }

    /// Runs the service, writing updates as JSON lines to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting fails, the client gives up, or the
    /// output cannot be written.
    pub async fn run_with_output<W: Write>(&self, out: &mut W) -> Result<u64, StreamerError> {
        self.running.store(true, Ordering::Relaxed);

        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity);
        let started: Result<Vec<SubscriptionHandle>, StreamerError> = match self.subscribe_all(&tx).await {
            Ok(handles) => self.client.connect().await.map(|()| handles).map_err(Into::into),
            Err(err) => Err(err),
        };
        drop(tx);

        let handles = match started {
            Ok(handles) => handles,
            Err(err) => {
                self.running.store(false, Ordering::Relaxed);
                return Err(err);
            }
        };

        info!(
            "Streamer started with {} quote and {} chart streams",
            self.config.quotes.len(),
            self.config.charts.len()
        );

        let mut state = self.client.state_receiver();
        let mut ticker = tokio::time::interval(self.config.metrics_interval());
        ticker.tick().await;

        let mut written = 0u64;
        let result = loop {
            if !self.is_running() {
                break Ok(());
            }

            tokio::select! {
                _ = self.shutdown.notified() => break Ok(()),
                update = rx.recv() => {
                    let Some(update) = update else {
                        break Ok(());
                    };
                    if let MarketUpdate::Error { key, message } = &update {
                        warn!(%key, %message, "Stream rejected by server");
                    }
                    if let Err(err) = write_update(out, &update) {
                        break Err(err);
                    }
                    written += 1;
                    if self.config.max_updates.is_some_and(|max| written >= max) {
                        info!(written, "Update limit reached");
                        break Ok(());
                    }
                }
                changed = state.changed() => {
                    let closed = changed.is_err() || state.borrow().is_closed();
                    if closed {
                        break match self.client.last_error().await {
                            Some(err) => Err(err.into()),
                            None => Ok(()),
                        };
                    }
                    let current = *state.borrow();
                    debug!(state = %current, "Connection state changed");
                }
                _ = ticker.tick() => log_metrics(&self.metrics().snapshot()),
            }
        };

        for handle in &handles {
            if let Err(err) = self.client.unsubscribe(handle).await {
                debug!(error = %err, "Unsubscribe skipped");
            }
        }
        self.client.close().await;
        self.running.store(false, Ordering::Relaxed);

        log_metrics(&self.metrics().snapshot());
        info!(written, "Streamer stopped");
        result.map(|()| written)
    }
}

fn write_update<W: Write>(out: &mut W, update: &MarketUpdate) -> Result<(), StreamerError> {
    serde_json::to_writer(&mut *out, update)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

fn log_metrics(snapshot: &WsMetricsSnapshot) {
    info!(
        frames = snapshot.frames_received,
        delivered = snapshot.updates_delivered,
        dropped = snapshot.messages_dropped,
        unrouted = snapshot.messages_unrouted,
        reconnects = snapshot.reconnects,
        handler_failures = snapshot.handler_failures,
        "Streamer metrics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use serde_json::Value;
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use tvfeed_sdk::codec::{FrameBuffer, FrameCodec};
    use tvfeed_sdk::ws::{Connection, Connector, FrameSink, TransportError};
    use tvfeed_sdk::WsConfig;

    const HELLO: &str =
        r#"{"session_id":"<0.1.2>_test","timestamp":1700000000,"release":"test","protocol":"json"}"#;

    type Inbound = mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>;

    /// Answers every `quote_add_symbols` with one `qsd` carrying `lp`.
    struct QuoteResponder {
        inbound: Inbound,
        buffer: FrameBuffer,
    }

    #[async_trait]
    impl FrameSink for QuoteResponder {
        async fn send(&mut self, text: String) -> Result<(), TransportError> {
            self.buffer.extend(text.as_bytes());
            while let Ok(Some(frame)) = self.buffer.next_frame() {
                let Ok(call) = serde_json::from_str::<Value>(&frame.payload) else {
                    continue;
                };
                if call["m"] != "quote_add_symbols" {
                    continue;
                }
                let session = call["p"][0].as_str().unwrap_or_default().to_string();
                let symbol = call["p"][1].as_str().unwrap_or_default().to_string();
                let payload = serde_json::json!({
                    "m": "qsd",
                    "p": [session, {"n": symbol, "s": "ok", "v": {"lp": 150.25}}],
                });
                let _ = self
                    .inbound
                    .send(Ok(FrameCodec::encode(&payload.to_string()).into_bytes()));
            }
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct LoopbackConnector;

    #[async_trait]
    impl Connector for LoopbackConnector {
        async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
            let (inbound, rx) = mpsc::unbounded_channel();
            let _ = inbound.send(Ok(FrameCodec::encode(HELLO).into_bytes()));
            Ok(Connection {
                sink: Box::new(QuoteResponder {
                    inbound,
                    buffer: FrameBuffer::new(FrameCodec::default()),
                }),
                stream: UnboundedReceiverStream::new(rx).boxed(),
            })
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
            Err(TransportError::Connect("connection refused".to_string()))
        }
    }

    fn service_with(config: StreamerConfig, connector: Arc<dyn Connector>) -> StreamerService {
        let client =
            TradingViewClient::with_connector(WsConfig::default(), connector).expect("client");
        StreamerService::with_client(config, client)
    }

    #[test]
    fn test_service_new_invalid_config() {
        let result = StreamerService::new(StreamerConfig::default());
        assert!(matches!(result, Err(StreamerError::Config(_))));
    }

    #[tokio::test]
    async fn test_service_new() {
        let config = StreamerConfig::with_quotes(vec!["NASDAQ:AAPL".to_string()]);
        let service = StreamerService::new(config).expect("service");
        assert!(!service.is_running());
        assert_eq!(service.metrics().updates_delivered(), 0);
        assert_eq!(service.config().quotes.len(), 1);
    }

    #[tokio::test]
    async fn test_service_prints_quote_lines() {
        let config = StreamerConfig::with_quotes(vec!["NASDAQ:AAPL".to_string()])
            .with_quote_fields(vec!["lp".to_string()])
            .with_max_updates(1);
        let service = service_with(config, Arc::new(LoopbackConnector));

        let mut out = Vec::new();
        let written = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            service.run_with_output(&mut out),
        )
        .await
        .expect("run finished")
        .expect("run ok");

        assert_eq!(written, 1);
        assert!(!service.is_running());

        let line = String::from_utf8(out).expect("utf8");
        let update: Value = serde_json::from_str(line.trim()).expect("json line");
        assert_eq!(update["type"], "quote");
        assert_eq!(update["symbol"], "NASDAQ:AAPL");
        assert_eq!(update["field"], "lp");
    }

    #[tokio::test]
    async fn test_service_connect_failure() {
        let config = StreamerConfig::with_quotes(vec!["NASDAQ:AAPL".to_string()]);
        let service = service_with(config, Arc::new(RefusingConnector));

        let mut out = Vec::new();
        let result = service.run_with_output(&mut out).await;
        assert!(matches!(result, Err(StreamerError::Ws(_))));
        assert!(!service.is_running());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_service_stop() {
        let config = StreamerConfig::with_quotes(vec!["NASDAQ:AAPL".to_string()])
            .with_quote_fields(vec!["volume".to_string()]);
        let service = Arc::new(service_with(config, Arc::new(LoopbackConnector)));

        let runner = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let mut sink = std::io::sink();
                service.run_with_output(&mut sink).await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        service.stop();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), runner)
            .await
            .expect("stopped in time")
            .expect("join");
        assert!(result.is_ok());
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_service_search_not_configured() {
        let config = StreamerConfig::with_quotes(vec!["NASDAQ:AAPL".to_string()]);
        let service = service_with(config, Arc::new(RefusingConnector));
        let search = SymbolSearchClient::with_defaults().expect("search client");

        let found = service.search(&search).await.expect("search");
        assert!(found.is_empty());
    }
}

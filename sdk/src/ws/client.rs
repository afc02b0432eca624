//! TradingView streaming client.
//!
//! Provides the public API over the session state machine and the
//! subscription registry.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::config::WsConfig;
use super::error::{SubscriptionError, WsError};
use super::handler::Handler;
use super::metrics::WsMetrics;
use super::registry::SubscriptionHandle;
use super::session::{self, ErrorHandler, Shared};
use super::state::ConnectionState;
use super::transport::{Connector, TungsteniteConnector};
use crate::types::{validate_symbol, Resolution, SubscriptionKey};

/// Anonymous TradingView market-data client.
///
/// One instance owns one logical connection. Dropping the client closes it.
pub struct TradingViewClient {
    shared: Arc<Shared>,
}

impl TradingViewClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: WsConfig) -> Result<Self, WsError> {
        let connector = TungsteniteConnector::new(config.origin.clone());
        Self::with_connector(config, Arc::new(connector))
    }

    /// Creates a new client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_defaults() -> Result<Self, WsError> {
        Self::new(WsConfig::default())
    }

    /// Creates a new client that opens connections through `connector`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_connector(config: WsConfig, connector: Arc<dyn Connector>) -> Result<Self, WsError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config, connector)),
        })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &WsConfig {
        &self.shared.config
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Returns a receiver that observes state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_receiver()
    }

    /// Returns the client metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<WsMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Returns the last fatal error, if any.
    pub async fn last_error(&self) -> Option<WsError> {
        self.shared.last_error().await
    }

    /// Registers a callback for fatal errors raised after `connect()` returned.
    pub async fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&WsError) + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(handler);
        self.shared.set_error_handler(handler).await;
    }

    /// Connects and waits until the session is ready.
    ///
    /// Subscriptions registered before connecting are sent once the session
    /// is ready. After this returns, the connection is maintained in the
    /// background until `close()`.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Connection` if the transport cannot be opened,
    /// `WsError::Handshake` if the server never completes the handshake, and
    /// `WsError::AlreadyConnected` or `WsError::Closed` if the client is not
    /// in the disconnected state.
    pub async fn connect(&self) -> Result<(), WsError> {
        session::connect(&self.shared).await
    }

    /// Subscribes to real-time quote fields for a symbol.
    ///
    /// An empty `fields` list requests every field.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is invalid or the client is closed.
    pub async fn subscribe_quote(
        &self,
        symbol: &str,
        fields: &[&str],
        handler: Handler,
    ) -> Result<SubscriptionHandle, WsError> {
        validate_symbol(symbol)?;
        let fields = fields.iter().map(|f| (*f).to_string()).collect();
        self.subscribe(SubscriptionKey::quote(symbol), fields, handler)
            .await
    }

    /// Subscribes to a bar series for a symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is invalid or the client is closed.
    pub async fn subscribe_chart(
        &self,
        symbol: &str,
        resolution: Resolution,
        handler: Handler,
    ) -> Result<SubscriptionHandle, WsError> {
        validate_symbol(symbol)?;
        self.subscribe(SubscriptionKey::chart(symbol, resolution), Vec::new(), handler)
            .await
    }

    async fn subscribe(
        &self,
        key: SubscriptionKey,
        fields: Vec<String>,
        handler: Handler,
    ) -> Result<SubscriptionHandle, WsError> {
        let mut core = self.shared.core.lock().await;
        if self.state().is_closed() {
            return Err(SubscriptionError::ClientClosed.into());
        }

        let (handle, message) = core.registry.subscribe(key, fields, handler);
        if let (Some(message), Some(writer)) = (message, core.writer.as_ref()) {
            if let Err(err) = session::send_control(writer, &[message]) {
                // the replay after reconnecting covers it
                debug!(error = %err, "subscribe not sent");
            }
        }

        Ok(handle)
    }

    /// Removes one subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is unknown or the client is closed.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), WsError> {
        let mut core = self.shared.core.lock().await;
        if self.state().is_closed() {
            return Err(SubscriptionError::ClientClosed.into());
        }

        let message = core.registry.unsubscribe(handle)?;
        if let (Some(message), Some(writer)) = (message, core.writer.as_ref()) {
            if let Err(err) = session::send_control(writer, &[message]) {
                debug!(error = %err, "unsubscribe not sent");
            }
        }

        Ok(())
    }

    /// Asks the server for `count` bars older than the ones already loaded
    /// for a chart subscription. They arrive as a regular series update.
    ///
    /// The request is not replayed after a reconnect; the new series starts
    /// from the configured bar count again.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is unknown or not a chart, the client
    /// is closed or not connected, or the outbound queue is full.
    pub async fn request_more_data(
        &self,
        handle: &SubscriptionHandle,
        count: u32,
    ) -> Result<(), WsError> {
        let core = self.shared.core.lock().await;
        if self.state().is_closed() {
            return Err(SubscriptionError::ClientClosed.into());
        }

        let message = core.registry.request_more(handle, count)?;
        let writer = core
            .writer
            .as_ref()
            .ok_or_else(|| SubscriptionError::Send("not connected".to_string()))?;
        session::send_control(writer, &[message])?;
        Ok(())
    }

    /// Closes the client. Idempotent.
    ///
    /// Stops the background tasks, releases the connection, and drops every
    /// subscription.
    pub async fn close(&self) {
        self.shared.shutdown().await;
    }
}

impl fmt::Debug for TradingViewClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradingViewClient")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for TradingViewClient {
    fn drop(&mut self) {
        self.shared.signal_close();
    }
}

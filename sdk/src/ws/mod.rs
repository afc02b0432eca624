//! WebSocket client for real-time TradingView market data.
//!
//! This module maintains one anonymous session with the TradingView data
//! socket: it performs the handshake, answers heartbeats, reconnects with
//! backoff, and routes quote and chart updates to subscription handlers.
//!
//! # Example
//!
//! ```rust,ignore
//! use tvfeed_sdk::ws::{Handler, TradingViewClient};
//! use tvfeed_sdk::Resolution;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TradingViewClient::with_defaults()?;
//!     client.connect().await?;
//!
//!     client
//!         .subscribe_quote("NASDAQ:AAPL", &["lp", "volume"], Handler::from_fn(|update| {
//!             println!("{:?}", update);
//!         }))
//!         .await?;
//!
//!     client
//!         .subscribe_chart("BINANCE:BTCUSDT", Resolution::minutes(1)?, Handler::from_fn(|update| {
//!             println!("{:?}", update);
//!         }))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::TradingViewClient;
pub use config::WsConfig;
pub use error::{HandlerError, HandshakeError, SubscriptionError, TransportError, WsError};
pub use handler::Handler;
pub use metrics::{WsMetrics, WsMetricsSnapshot};
pub use queue::{MessageQueue, QueueReceiver, Received};
pub use registry::{Delivery, SubscriptionHandle, SubscriptionRegistry};
pub use session::ErrorHandler;
pub use state::ConnectionState;
pub use transport::{Connection, Connector, FrameSink, InboundStream, TungsteniteConnector};

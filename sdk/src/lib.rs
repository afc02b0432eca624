//! TradingView feed SDK - anonymous real-time market data over WebSocket.
//!
//! This crate speaks the framed JSON protocol of the TradingView data socket
//! using the anonymous token only. It never places orders or touches paid
//! data.
//!
//! # Modules
//!
//! - [`codec`] — `~m~{len}~m~{payload}` framing
//! - [`protocol`] — typed inbound/outbound messages
//! - [`ws`] — session state machine, subscriptions and the [`TradingViewClient`]
//! - [`client`] — HTTP symbol search
//! - [`types`] — resolutions, subscription keys, quote and bar updates
//!
//! # Core Types
//!
//! - [`Resolution`] — Chart bar interval (`1`, `60`, `1D`, `1W`...)
//! - [`SubscriptionKey`] — Stream type, symbol and resolution
//! - [`MarketUpdate`] — What a subscription handler receives
//!
//! # Example
//!
//! ```rust
//! use tvfeed_sdk::{Resolution, SubscriptionKey};
//!
//! let resolution = Resolution::minutes(5).expect("valid resolution");
//! let key = SubscriptionKey::chart("BINANCE:BTCUSDT", resolution);
//! assert_eq!(key.symbol, "BINANCE:BTCUSDT");
//! assert_eq!(key.to_string(), "chart:BINANCE:BTCUSDT@5");
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod types;
pub mod ws;

pub use client::{ClientError, SearchConfig, SymbolSearchClient};
pub use error::SdkError;
pub use types::{
    Bar, MarketUpdate, QuoteUpdate, QuoteValue, Resolution, SeriesUpdate, StreamType,
    SubscriptionKey, SymbolMatch,
};
pub use ws::{ConnectionState, Handler, SubscriptionHandle, TradingViewClient, WsConfig, WsError};

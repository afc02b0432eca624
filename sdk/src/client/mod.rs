//! HTTP client for the TradingView symbol search.
//!
//! Resolves free text such as `apple` or `btcusdt` into feed symbols that can
//! be passed to the WebSocket subscriptions.
//!
//! # Example
//!
//! ```rust,ignore
//! use tvfeed_sdk::client::SymbolSearchClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SymbolSearchClient::with_defaults()?;
//!
//!     for found in client.search("AAPL", Some("NASDAQ")).await? {
//!         println!("{} - {}", found.full_symbol(), found.description);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;

pub use config::SearchConfig;
pub use error::ClientError;
pub use http::{strip_highlight, SymbolSearchClient};

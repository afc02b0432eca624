//! Core types for the TradingView feed SDK.
//!
//! This module provides the domain values shared by the protocol layer, the
//! subscription registry and the handlers that consume updates.

pub mod primitives;
pub mod quote;
pub mod series;
pub mod symbol;
pub mod update;

pub use primitives::{validate_symbol, Resolution, StreamType, SubscriptionKey};
pub use quote::{QuoteUpdate, QuoteValue};
pub use series::{Bar, SeriesUpdate};
pub use symbol::SymbolMatch;
pub use update::MarketUpdate;

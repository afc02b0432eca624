//! Update records delivered to subscription handlers.

use serde::Serialize;
use serde_json::Value;

use super::primitives::SubscriptionKey;
use super::quote::QuoteUpdate;
use super::series::SeriesUpdate;

/// A decoded update routed to the handlers of one subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketUpdate {
    /// One quote field changed.
    Quote(QuoteUpdate),

    /// New or updated bars.
    Series(SeriesUpdate),

    /// Market metadata of a chart subscription, sent once the server has
    /// resolved the symbol.
    SymbolInfo {
        /// Affected subscription.
        key: SubscriptionKey,
        /// Raw metadata object (name, exchange, pricescale, session, ...).
        info: Value,
    },

    /// The server rejected the symbol or the series for this subscription.
    Error {
        /// Affected subscription.
        key: SubscriptionKey,
        /// Server supplied reason.
        message: String,
    },
}

impl MarketUpdate {
    /// Returns the symbol the update refers to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Quote(update) => &update.symbol,
            Self::Series(update) => &update.symbol,
            Self::SymbolInfo { key, .. } | Self::Error { key, .. } => &key.symbol,
        }
    }

    /// Returns true if this is an error notification.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QuoteValue, Resolution};

    #[test]
    fn test_market_update_symbol() {
        let update = MarketUpdate::Quote(QuoteUpdate::new("NASDAQ:AAPL", "lp", QuoteValue::Null));
        assert_eq!(update.symbol(), "NASDAQ:AAPL");
        assert!(!update.is_error());

        let update = MarketUpdate::Error {
            key: SubscriptionKey::quote("NASDAQ:NOPE"),
            message: "invalid symbol".to_string(),
        };
        assert_eq!(update.symbol(), "NASDAQ:NOPE");
        assert!(update.is_error());
    }

    #[test]
    fn test_symbol_info_update() {
        let update = MarketUpdate::SymbolInfo {
            key: SubscriptionKey::chart("BINANCE:BTCUSDT", Resolution::daily()),
            info: serde_json::json!({"pricescale": 100}),
        };
        assert_eq!(update.symbol(), "BINANCE:BTCUSDT");
        assert!(!update.is_error());

        let json = serde_json::to_value(&update).expect("serialize");
        assert_eq!(json["type"], "symbol_info");
        assert_eq!(json["info"]["pricescale"], 100);
    }

    #[test]
    fn test_market_update_serialize_tag() {
        let update = MarketUpdate::Quote(QuoteUpdate::new("NASDAQ:AAPL", "lp", QuoteValue::Null));
        let json = serde_json::to_string(&update).expect("serialize");
        assert!(json.contains("\"type\":\"quote\""));
    }
}

//! Symbol search result types.

use serde::{Deserialize, Serialize};

/// One match returned by the symbol search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMatch {
    /// Ticker without exchange prefix (e.g. `AAPL`).
    pub symbol: String,

    /// Exchange name (e.g. `NASDAQ`).
    pub exchange: String,

    /// Human readable description.
    #[serde(default)]
    pub description: String,

    /// Instrument kind (`stock`, `crypto`, `forex`, `index`...).
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Quote currency, when reported.
    #[serde(rename = "currency_code", default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Symbol prefix used by the data feed when it differs from the exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl SymbolMatch {
    /// Returns the feed symbol usable in subscriptions (`EXCHANGE:SYMBOL`).
    #[must_use]
    pub fn full_symbol(&self) -> String {
        let exchange = self.prefix.as_deref().unwrap_or(&self.exchange);
        format!("{}:{}", exchange, self.symbol)
    }
}

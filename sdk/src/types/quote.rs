//! Quote types for the TradingView feed SDK.
//!
//! Provides the per-field update record delivered to quote subscribers.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use super::primitives::decimal_from_number;

/// Value of a single quote field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuoteValue {
    /// Numeric field (price, volume, change...).
    Number(Decimal),
    /// Text field (description, currency code...).
    Text(String),
    /// Boolean field.
    Bool(bool),
    /// Explicit null sent by the server.
    Null,
    /// Anything else, kept verbatim.
    Other(serde_json::Value),
}

impl QuoteValue {
    /// Builds a value from the raw JSON field.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(number) => decimal_from_number(number)
                .map(Self::Number)
                .unwrap_or_else(|| Self::Other(value.clone())),
            serde_json::Value::String(text) => Self::Text(text.clone()),
            serde_json::Value::Bool(flag) => Self::Bool(*flag),
            serde_json::Value::Null => Self::Null,
            other => Self::Other(other.clone()),
        }
    }

    /// Returns the decimal value if numeric.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text value if textual.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for QuoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{}", value),
            Self::Text(value) => write!(f, "{}", value),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Null => write!(f, "null"),
            Self::Other(value) => write!(f, "{}", value),
        }
    }
}

/// One field change for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteUpdate {
    /// Market symbol.
    pub symbol: String,

    /// Field name (`lp`, `volume`, `ch`...).
    pub field: String,

    /// New value.
    pub value: QuoteValue,
}

impl QuoteUpdate {
    /// Creates a new quote update.
    #[must_use]
    pub fn new(symbol: impl Into<String>, field: impl Into<String>, value: QuoteValue) -> Self {
        Self {
            symbol: symbol.into(),
            field: field.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_quote_value_from_json() {
        let value = QuoteValue::from_json(&serde_json::json!(150.25));
        assert_eq!(
            value.as_decimal(),
            Some(Decimal::from_str("150.25").expect("decimal"))
        );

        let value = QuoteValue::from_json(&serde_json::json!("USD"));
        assert_eq!(value.as_str(), Some("USD"));

        assert_eq!(
            QuoteValue::from_json(&serde_json::json!(true)),
            QuoteValue::Bool(true)
        );
        assert_eq!(
            QuoteValue::from_json(&serde_json::Value::Null),
            QuoteValue::Null
        );
        assert!(matches!(
            QuoteValue::from_json(&serde_json::json!([1, 2])),
            QuoteValue::Other(_)
        ));
    }

    #[test]
    fn test_quote_value_keeps_tick_precision() {
        let value = QuoteValue::from_json(&serde_json::json!(0.1));
        assert_eq!(value.to_string(), "0.1");

        let value = QuoteValue::from_json(&serde_json::json!(43521.37));
        assert_eq!(value.to_string(), "43521.37");
    }

    #[test]
    fn test_quote_update_serialize() {
        let update = QuoteUpdate::new(
            "NASDAQ:AAPL",
            "lp",
            QuoteValue::Number(Decimal::from_str("150.25").expect("decimal")),
        );
        let json = serde_json::to_string(&update).expect("serialize");
        assert!(json.contains("\"symbol\":\"NASDAQ:AAPL\""));
        assert!(json.contains("\"field\":\"lp\""));
        assert!(json.contains("150.25"));
    }
}

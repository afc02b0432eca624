//! Series types for the TradingView feed SDK.
//!
//! Provides OHLCV bars and the series update delivered to chart subscribers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::primitives::{decimal_from_number, Resolution};
use crate::error::SdkError;

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    /// Position of the bar in the server-side series.
    pub index: u64,

    /// Bar open time.
    pub time: DateTime<Utc>,

    /// Open price.
    pub open: Decimal,

    /// High price.
    pub high: Decimal,

    /// Low price.
    pub low: Decimal,

    /// Close price.
    pub close: Decimal,

    /// Traded volume (absent for instruments without volume, e.g. indices).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
}

impl Bar {
    /// Builds a bar from the server's `[time, open, high, low, close, volume?]`
    /// value array.
    ///
    /// # Errors
    ///
    /// Returns an error if a mandatory value is missing or not numeric, or
    /// the timestamp is out of range.
    pub fn from_values(index: u64, values: &[serde_json::Value]) -> Result<Self, SdkError> {
        let time = values
            .first()
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| SdkError::InvalidNumber("bar time".to_string()))?;
        let seconds = time.trunc() as i64;
        let time =
            DateTime::from_timestamp(seconds, 0).ok_or(SdkError::InvalidTimestamp(seconds))?;

        let price = |position: usize, name: &str| -> Result<Decimal, SdkError> {
            values
                .get(position)
                .and_then(serde_json::Value::as_number)
                .and_then(decimal_from_number)
                .ok_or_else(|| SdkError::InvalidNumber(format!("bar {}", name)))
        };

        Ok(Self {
            index,
            time,
            open: price(1, "open")?,
            high: price(2, "high")?,
            low: price(3, "low")?,
            close: price(4, "close")?,
            volume: values
                .get(5)
                .and_then(serde_json::Value::as_number)
                .and_then(decimal_from_number),
        })
    }

    /// Returns true if the bar closed above its open.
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// A batch of bars for one chart subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesUpdate {
    /// Market symbol.
    pub symbol: String,

    /// Chart resolution.
    pub resolution: Resolution,

    /// Bars in server order (a snapshot on load, then one or two bars per tick).
    pub bars: Vec<Bar>,
}

impl SeriesUpdate {
    /// Returns the most recent bar.
    #[must_use]
    pub fn latest(&self) -> Option<&Bar> {
        self.bars.iter().max_by_key(|bar| bar.time)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal")
    }

    #[test]
    fn test_bar_from_values() {
        let values = serde_json::json!([1700000000.0, 189.5, 190.25, 188.75, 189.95, 1523400.0]);
        let values = values.as_array().expect("array");
        let bar = Bar::from_values(7, values).expect("bar");

        assert_eq!(bar.index, 7);
        assert_eq!(bar.time.timestamp(), 1_700_000_000);
        assert_eq!(bar.open, dec("189.5"));
        assert_eq!(bar.high, dec("190.25"));
        assert_eq!(bar.low, dec("188.75"));
        assert_eq!(bar.close, dec("189.95"));
        assert_eq!(bar.volume, Some(dec("1523400")));
        assert!(bar.is_bullish());
    }

    #[test]
    fn test_bar_without_volume() {
        let values = serde_json::json!([1700000000, 10, 11, 9, 9.5]);
        let bar = Bar::from_values(0, values.as_array().expect("array")).expect("bar");
        assert!(bar.volume.is_none());
        assert!(!bar.is_bullish());
    }

    #[test]
    fn test_bar_missing_price() {
        let values = serde_json::json!([1700000000, 10, 11]);
        let result = Bar::from_values(0, values.as_array().expect("array"));
        assert!(matches!(result, Err(SdkError::InvalidNumber(_))));
    }

    #[test]
    fn test_series_latest() {
        let first = serde_json::json!([1700000000, 1, 1, 1, 1]);
        let second = serde_json::json!([1700000060, 2, 2, 2, 2]);
        let update = SeriesUpdate {
            symbol: "BINANCE:BTCUSDT".to_string(),
            resolution: Resolution::minutes(1).expect("resolution"),
            bars: vec![
                Bar::from_values(1, second.as_array().expect("array")).expect("bar"),
                Bar::from_values(0, first.as_array().expect("array")).expect("bar"),
            ],
        };
        assert_eq!(update.latest().map(|bar| bar.index), Some(1));
    }
}

//! Primitive types for the TradingView feed SDK.
//!
//! Provides stream kinds, chart resolutions and the subscription key that
//! identifies one logical data stream.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Maximum accepted symbol length.
pub const MAX_SYMBOL_LEN: usize = 64;

/// Kind of server-side stream a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    /// Real-time field updates served by the quote session.
    Quote,
    /// Bar series served by a dedicated chart session.
    Chart,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quote => write!(f, "quote"),
            Self::Chart => write!(f, "chart"),
        }
    }
}

/// A chart resolution as understood by the server.
///
/// A bare number is a period in minutes (`"1"`, `"60"`, `"240"`). A number
/// may be followed by a unit: `S` seconds, `D` days, `W` weeks, `M` months.
/// The unit alone means one of it (`"D"` is the same period as `"1D"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution(String);

impl Resolution {
    /// Creates a validated resolution.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::InvalidResolution` if the value is not a valid
    /// resolution string.
    pub fn new(value: impl Into<String>) -> Result<Self, SdkError> {
        let value = value.into();
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(SdkError::InvalidResolution(value))
        }
    }

    /// Resolution of `n` minutes.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` is zero or too large.
    pub fn minutes(n: u32) -> Result<Self, SdkError> {
        Self::new(n.to_string())
    }

    /// One-day resolution.
    #[must_use]
    pub fn daily() -> Self {
        Self("1D".to_string())
    }

    /// One-week resolution.
    #[must_use]
    pub fn weekly() -> Self {
        Self("1W".to_string())
    }

    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(value: &str) -> bool {
        let digits_end = value
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(value.len());
        let (digits, unit) = value.split_at(digits_end);

        if digits.starts_with('0') || digits.len() > 4 {
            return false;
        }

        match unit {
            "" => !digits.is_empty(),
            "S" | "D" | "W" | "M" => true,
            _ => false,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Resolution {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Resolution {
    type Error = SdkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.0
    }
}

/// Validates a market symbol such as `NASDAQ:AAPL`.
///
/// # Errors
///
/// Returns `SdkError::InvalidSymbol` for empty, oversized, or whitespace
/// containing symbols.
pub fn validate_symbol(symbol: &str) -> Result<(), SdkError> {
    if symbol.is_empty() {
        return Err(SdkError::InvalidSymbol("symbol cannot be empty".to_string()));
    }

    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(SdkError::InvalidSymbol(format!(
            "symbol longer than {} bytes",
            MAX_SYMBOL_LEN
        )));
    }

    if symbol
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '"')
    {
        return Err(SdkError::InvalidSymbol(symbol.to_string()));
    }

    Ok(())
}

/// Identifies one logical data stream: stream kind, symbol, and the
/// resolution for chart streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    /// Stream kind.
    pub stream: StreamType,

    /// Market symbol.
    pub symbol: String,

    /// Chart resolution (None for quote streams).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl SubscriptionKey {
    /// Creates a quote stream key.
    #[must_use]
    pub fn quote(symbol: impl Into<String>) -> Self {
        Self {
            stream: StreamType::Quote,
            symbol: symbol.into(),
            resolution: None,
        }
    }

    /// Creates a chart stream key.
    #[must_use]
    pub fn chart(symbol: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            stream: StreamType::Chart,
            symbol: symbol.into(),
            resolution: Some(resolution),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resolution {
            Some(resolution) => write!(f, "{}:{}@{}", self.stream, self.symbol, resolution),
            None => write!(f, "{}:{}", self.stream, self.symbol),
        }
    }
}

/// Converts a JSON number into a decimal without going through a lossy
/// float conversion of the printed value.
///
/// The number's shortest textual form is parsed; scientific notation is
/// accepted. Returns None for values a decimal cannot hold.
#[must_use]
pub fn decimal_from_number(number: &serde_json::Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

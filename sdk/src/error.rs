//! SDK error types.
//!
//! Provides error types for validating domain values such as symbols and
//! chart resolutions.

/// SDK errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// Invalid symbol.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Invalid chart resolution.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    /// Invalid quote field name.
    #[error("invalid quote field: {0}")]
    InvalidField(String),

    /// Numeric value could not be represented as a decimal.
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// Timestamp outside the representable range.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

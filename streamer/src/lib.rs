//! TradingView streamer - prints live quotes and bars as JSON lines.
//!
//! This crate wraps [`tvfeed_sdk::TradingViewClient`] into a long-running
//! service: it subscribes the configured symbols, forwards every update
//! through a bounded channel and writes it to stdout, logging client metrics
//! periodically.
//!
//! # Components
//!
//! - [`config`]: Streamer configuration
//! - [`service`]: Main streamer service

pub mod config;
pub mod service;

pub use config::{ChartSpec, ConfigError, StreamerConfig};
pub use service::{StreamerError, StreamerService};

//! WebSocket configuration.
//!
//! Provides configuration options for the TradingView streaming client.

use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_LEN;
use crate::protocol::ANONYMOUS_AUTH_TOKEN;

/// Default WebSocket URL.
pub const DEFAULT_WS_URL: &str = "wss://data.tradingview.com/socket.io/websocket";

/// Origin header expected by the server.
pub const DEFAULT_ORIGIN: &str = "https://www.tradingview.com";

/// Default server heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Default reconnect delay in seconds.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 1;

/// Maximum reconnect delay in seconds.
pub const MAX_RECONNECT_DELAY_SECS: u64 = 30;

/// Default time to wait for the server greeting, in seconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Default number of consecutive handshake failures tolerated.
pub const DEFAULT_MAX_HANDSHAKE_ATTEMPTS: u32 = 3;

/// Default capacity of the inbound message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default capacity of the outbound control channel.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Default number of historical bars requested per chart.
pub const DEFAULT_CHART_BAR_COUNT: u32 = 300;

/// WebSocket configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL.
    pub url: String,

    /// Origin header sent with the upgrade request.
    pub origin: String,

    /// Expected server heartbeat interval.
    pub heartbeat_interval: Duration,

    /// Silence after which the connection is considered dead.
    pub idle_timeout: Duration,

    /// Initial reconnect delay.
    pub reconnect_delay: Duration,

    /// Maximum reconnect delay.
    pub max_reconnect_delay: Duration,

    /// Maximum reconnection attempts (None = unlimited).
    pub max_reconnect_attempts: Option<u32>,

    /// Time to wait for the server greeting.
    pub handshake_timeout: Duration,

    /// Consecutive handshake failures before giving up.
    pub max_handshake_attempts: u32,

    /// Largest accepted frame payload in bytes.
    pub max_frame_len: usize,

    /// Capacity of the inbound message queue.
    pub queue_capacity: usize,

    /// Capacity of the outbound control channel.
    pub outbound_capacity: usize,

    /// Historical bars requested for each chart subscription.
    pub chart_bar_count: u32,

    /// Auth token sent in `set_auth_token`.
    pub auth_token: String,
}

impl Default for WsConfig {
    fn default() -> Self {
        let heartbeat_interval = Duration::from_secs(DEFAULT_HEARTBEAT_SECS);
        Self {
            url: DEFAULT_WS_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            heartbeat_interval,
            idle_timeout: heartbeat_interval * 2,
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            max_reconnect_delay: Duration::from_secs(MAX_RECONNECT_DELAY_SECS),
            max_reconnect_attempts: None,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            max_handshake_attempts: DEFAULT_MAX_HANDSHAKE_ATTEMPTS,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            chart_bar_count: DEFAULT_CHART_BAR_COUNT,
            auth_token: ANONYMOUS_AUTH_TOKEN.to_string(),
        }
    }
}

impl WsConfig {
    /// Creates a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the expected heartbeat interval and derives the idle timeout from it.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.idle_timeout = interval * 2;
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the initial reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the maximum reconnect delay.
    #[must_use]
    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    /// Sets the maximum reconnection attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the number of handshake attempts.
    #[must_use]
    pub fn with_max_handshake_attempts(mut self, attempts: u32) -> Self {
        self.max_handshake_attempts = attempts;
        self
    }

    /// Sets the maximum frame payload length.
    #[must_use]
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Sets the inbound queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets how many control messages may wait for the writer before
    /// subscribe calls stop sending and leave them to the next replay.
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Sets the number of historical bars per chart.
    #[must_use]
    pub fn with_chart_bar_count(mut self, count: u32) -> Self {
        self.chart_bar_count = count;
        self
    }

    /// Returns the reconnect delay for the given zero-based attempt.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), super::error::WsError> {
        let invalid = |msg: &str| Err(super::error::WsError::InvalidConfig(msg.to_string()));

        if self.url.is_empty() {
            return invalid("url cannot be empty");
        }

        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return invalid("url must start with ws:// or wss://");
        }

        if self.idle_timeout.is_zero() {
            return invalid("idle timeout must be positive");
        }

        if self.handshake_timeout.is_zero() {
            return invalid("handshake timeout must be positive");
        }

        if self.max_handshake_attempts == 0 {
            return invalid("max handshake attempts must be at least 1");
        }

        if self.reconnect_delay > self.max_reconnect_delay {
            return invalid("reconnect delay exceeds max reconnect delay");
        }

        if self.max_frame_len == 0 {
            return invalid("max frame length must be positive");
        }

        if self.queue_capacity == 0 || self.outbound_capacity == 0 {
            return invalid("channel capacities must be positive");
        }

        if self.chart_bar_count == 0 {
            return invalid("chart bar count must be positive");
        }

        if self.auth_token != ANONYMOUS_AUTH_TOKEN {
            return invalid("only the anonymous auth token is supported");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = WsConfig::default();
        assert_eq!(config.url, DEFAULT_WS_URL);
        assert_eq!(
            config.heartbeat_interval,
            Duration::from_secs(DEFAULT_HEARTBEAT_SECS)
        );
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.auth_token, "unauthorized_user_token");
        assert!(config.max_reconnect_attempts.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = WsConfig::new("wss://example.com/ws")
            .with_heartbeat_interval(Duration::from_secs(10))
            .with_reconnect_delay(Duration::from_secs(2))
            .with_max_reconnect_delay(Duration::from_secs(60))
            .with_max_reconnect_attempts(5)
            .with_handshake_timeout(Duration::from_secs(3))
            .with_max_handshake_attempts(2)
            .with_queue_capacity(8)
            .with_outbound_capacity(4)
            .with_chart_bar_count(50);

        assert_eq!(config.url, "wss://example.com/ws");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, Duration::from_secs(20));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(60));
        assert_eq!(config.max_reconnect_attempts, Some(5));
        assert_eq!(config.handshake_timeout, Duration::from_secs(3));
        assert_eq!(config.max_handshake_attempts, 2);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.outbound_capacity, 4);
        assert_eq!(config.chart_bar_count, 50);
    }

    #[test]
    fn test_config_backoff_is_capped() {
        let config = WsConfig::default()
            .with_reconnect_delay(Duration::from_millis(100))
            .with_max_reconnect_delay(Duration::from_secs(1));

        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
        assert_eq!(config.backoff(4), Duration::from_secs(1));
        assert_eq!(config.backoff(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_config_validate_empty_url() {
        let config = WsConfig::new("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_invalid_scheme() {
        let config = WsConfig::new("https://example.com/ws");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_rejects_zero_values() {
        assert!(WsConfig::default()
            .with_max_handshake_attempts(0)
            .validate()
            .is_err());
        assert!(WsConfig::default().with_queue_capacity(0).validate().is_err());
        assert!(WsConfig::default()
            .with_outbound_capacity(0)
            .validate()
            .is_err());
        assert!(WsConfig::default()
            .with_idle_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_validate_rejects_other_tokens() {
        let mut config = WsConfig::default();
        config.auth_token = "paid_token".to_string();
        assert!(config.validate().is_err());
    }
}

//! Client metrics tracking.
//!
//! Provides atomic counters for monitoring one streaming connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics for one `TradingViewClient`.
#[derive(Debug)]
pub struct WsMetrics {
    /// Frames decoded from the transport.
    frames_received: AtomicU64,

    /// Transport messages written.
    messages_sent: AtomicU64,

    /// Heartbeat echoes written.
    pongs_sent: AtomicU64,

    /// Successful connections (first connect and every reconnect).
    connections: AtomicU64,

    /// Reconnect attempts started.
    reconnects: AtomicU64,

    /// Framing errors.
    frame_errors: AtomicU64,

    /// Bytes skipped while resynchronizing the frame buffer.
    bytes_discarded: AtomicU64,

    /// Payloads that failed to parse.
    protocol_errors: AtomicU64,

    /// Messages dropped because the queue overflowed.
    messages_dropped: AtomicU64,

    /// Data messages with no matching subscription.
    messages_unrouted: AtomicU64,

    /// Updates handed to handlers.
    updates_delivered: AtomicU64,

    /// Handler errors and panics.
    handler_failures: AtomicU64,

    /// Start time for rate calculation.
    start_time: Instant,
}

impl Default for WsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WsMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            pongs_sent: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
            bytes_discarded: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            messages_unrouted: AtomicU64::new(0),
            updates_delivered: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a decoded frame.
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a transport write.
    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a heartbeat echo.
    pub fn record_pong(&self) {
        self.pongs_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a session becoming ready.
    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reconnect attempt.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a framing error and the bytes skipped because of it.
    pub fn record_frame_error(&self, discarded: u64) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
        self.bytes_discarded.fetch_add(discarded, Ordering::Relaxed);
    }

    /// Records a payload that failed to parse.
    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records messages lost to queue overflow.
    pub fn record_dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a data message nobody subscribed to.
    pub fn record_unrouted(&self) {
        self.messages_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an update handed to a handler.
    pub fn record_delivered(&self) {
        self.updates_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a handler error or panic.
    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the frames received.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Returns the transport messages sent.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Returns the heartbeat echoes sent.
    #[must_use]
    pub fn pongs_sent(&self) -> u64 {
        self.pongs_sent.load(Ordering::Relaxed)
    }

    /// Returns the number of sessions that became ready.
    #[must_use]
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Returns the reconnect attempts.
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Returns the framing errors.
    #[must_use]
    pub fn frame_errors(&self) -> u64 {
        self.frame_errors.load(Ordering::Relaxed)
    }

    /// Returns the bytes skipped while resynchronizing.
    #[must_use]
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded.load(Ordering::Relaxed)
    }

    /// Returns the payloads that failed to parse.
    #[must_use]
    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors.load(Ordering::Relaxed)
    }

    /// Returns the messages lost to queue overflow.
    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Returns the unrouted data messages.
    #[must_use]
    pub fn messages_unrouted(&self) -> u64 {
        self.messages_unrouted.load(Ordering::Relaxed)
    }

    /// Returns the updates delivered.
    #[must_use]
    pub fn updates_delivered(&self) -> u64 {
        self.updates_delivered.load(Ordering::Relaxed)
    }

    /// Returns the handler failures.
    #[must_use]
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns frames received per second.
    #[must_use]
    pub fn frames_per_second(&self) -> f64 {
        let elapsed = self.uptime().as_secs_f64();
        if elapsed > 0.0 {
            self.frames_received() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> WsMetricsSnapshot {
        WsMetricsSnapshot {
            frames_received: self.frames_received(),
            messages_sent: self.messages_sent(),
            pongs_sent: self.pongs_sent(),
            connections: self.connections(),
            reconnects: self.reconnects(),
            frame_errors: self.frame_errors(),
            bytes_discarded: self.bytes_discarded(),
            protocol_errors: self.protocol_errors(),
            messages_dropped: self.messages_dropped(),
            messages_unrouted: self.messages_unrouted(),
            updates_delivered: self.updates_delivered(),
            handler_failures: self.handler_failures(),
            uptime: self.uptime(),
            frames_per_second: self.frames_per_second(),
        }
    }
}

/// A point-in-time snapshot of client metrics.
#[derive(Debug, Clone)]
pub struct WsMetricsSnapshot {
    /// Frames received.
    pub frames_received: u64,
    /// Transport messages sent.
    pub messages_sent: u64,
    /// Heartbeat echoes sent.
    pub pongs_sent: u64,
    /// Sessions that became ready.
    pub connections: u64,
    /// Reconnect attempts.
    pub reconnects: u64,
    /// Framing errors.
    pub frame_errors: u64,
    /// Bytes skipped while resynchronizing.
    pub bytes_discarded: u64,
    /// Payloads that failed to parse.
    pub protocol_errors: u64,
    /// Messages lost to queue overflow.
    pub messages_dropped: u64,
    /// Data messages with no subscriber.
    pub messages_unrouted: u64,
    /// Updates handed to handlers.
    pub updates_delivered: u64,
    /// Handler errors and panics.
    pub handler_failures: u64,
    /// Uptime.
    pub uptime: Duration,
    /// Frames per second.
    pub frames_per_second: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = WsMetrics::new();
        assert_eq!(metrics.frames_received(), 0);
        assert_eq!(metrics.reconnects(), 0);
        assert_eq!(metrics.messages_dropped(), 0);
    }

    #[test]
    fn test_metrics_record_traffic() {
        let metrics = WsMetrics::default();

        metrics.record_frame_received();
        metrics.record_frame_received();
        metrics.record_message_sent();
        metrics.record_pong();

        assert_eq!(metrics.frames_received(), 2);
        assert_eq!(metrics.messages_sent(), 1);
        assert_eq!(metrics.pongs_sent(), 1);
    }

    #[test]
    fn test_metrics_record_errors() {
        let metrics = WsMetrics::new();

        metrics.record_frame_error(7);
        metrics.record_frame_error(3);
        metrics.record_protocol_error();
        metrics.record_handler_failure();
        metrics.record_dropped(5);

        assert_eq!(metrics.frame_errors(), 2);
        assert_eq!(metrics.bytes_discarded(), 10);
        assert_eq!(metrics.protocol_errors(), 1);
        assert_eq!(metrics.handler_failures(), 1);
        assert_eq!(metrics.messages_dropped(), 5);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = WsMetrics::new();

        metrics.record_connection();
        metrics.record_reconnect();
        metrics.record_delivered();
        metrics.record_unrouted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections, 1);
        assert_eq!(snapshot.reconnects, 1);
        assert_eq!(snapshot.updates_delivered, 1);
        assert_eq!(snapshot.messages_unrouted, 1);
    }
}

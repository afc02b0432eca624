//! Subscription handlers.
//!
//! A handler is any callback that accepts a `MarketUpdate`. Handler errors and
//! panics are contained so one subscriber cannot break routing for the others.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::error::HandlerError;
use crate::types::MarketUpdate;

type HandlerFn = dyn Fn(&MarketUpdate) -> Result<(), HandlerError> + Send + Sync;

/// Callback attached to a subscription.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    /// Wraps a fallible callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&MarketUpdate) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Wraps an infallible callback.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&MarketUpdate) + Send + Sync + 'static,
    {
        Self::new(move |update| {
            f(update);
            Ok(())
        })
    }

    /// Forwards updates into a bounded channel without blocking.
    ///
    /// A full channel or a dropped receiver is reported as a handler error.
    #[must_use]
    pub fn channel(tx: mpsc::Sender<MarketUpdate>) -> Self {
        Self::new(move |update| {
            tx.try_send(update.clone())
                .map_err(|e| HandlerError::Channel(e.to_string()))
        })
    }

    /// Invokes the callback, converting a panic into `HandlerError::Panicked`.
    ///
    /// # Errors
    ///
    /// Returns the handler's own error or the panic message.
    pub fn call(&self, update: &MarketUpdate) -> Result<(), HandlerError> {
        match catch_unwind(AssertUnwindSafe(|| (self.inner)(update))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(HandlerError::Panicked(message))
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::types::{QuoteUpdate, QuoteValue};

    fn update() -> MarketUpdate {
        MarketUpdate::Quote(QuoteUpdate::new("NASDAQ:AAPL", "lp", QuoteValue::Null))
    }

    #[test]
    fn test_handler_from_fn() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = Handler::from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handler.call(&update()).is_ok());
        assert!(handler.call(&update()).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_error_is_returned() {
        let handler = Handler::new(|_| Err(HandlerError::Failed("nope".to_string())));
        assert_eq!(
            handler.call(&update()),
            Err(HandlerError::Failed("nope".to_string()))
        );
    }

    #[test]
    fn test_handler_panic_is_caught() {
        let handler = Handler::from_fn(|_| panic!("boom"));
        assert_eq!(
            handler.call(&update()),
            Err(HandlerError::Panicked("boom".to_string()))
        );
    }

    #[test]
    fn test_channel_handler() {
        let (tx, mut rx) = mpsc::channel(1);
        let handler = Handler::channel(tx);

        assert!(handler.call(&update()).is_ok());
        assert!(matches!(
            handler.call(&update()),
            Err(HandlerError::Channel(_))
        ));
        assert_eq!(rx.try_recv().ok(), Some(update()));
    }
}

//! Bounded message queue between the receive loop and the router.
//!
//! Pushing never blocks. When the router falls behind, the oldest queued
//! messages are overwritten and the router is told how many it missed.

use tokio::sync::broadcast;

use crate::protocol::ProtocolMessage;

/// Producer side of the queue.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    tx: broadcast::Sender<ProtocolMessage>,
}

/// Consumer side of the queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: broadcast::Receiver<ProtocolMessage>,
}

/// Item read from the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// Next message in arrival order.
    Message(ProtocolMessage),
    /// This many messages were overwritten before they could be read.
    Lagged(u64),
}

impl MessageQueue {
    /// Creates a queue holding at least `capacity` messages.
    ///
    /// The effective capacity is rounded up to a power of two.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, QueueReceiver) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, QueueReceiver { rx })
    }

    /// Enqueues a message. Returns false once the receiver is gone.
    pub fn push(&self, message: ProtocolMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Returns the number of messages waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Returns true if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl QueueReceiver {
    /// Waits for the next item. Returns None once every producer is dropped
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<Received> {
        match self.rx.recv().await {
            Ok(message) => Some(Received::Message(message)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Some(Received::Lagged(skipped)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_preserves_order() {
        let (queue, mut rx) = MessageQueue::new(8);
        assert!(queue.push(ProtocolMessage::Ping(1)));
        assert!(queue.push(ProtocolMessage::Ping(2)));
        assert_eq!(queue.len(), 2);

        assert_eq!(
            rx.recv().await,
            Some(Received::Message(ProtocolMessage::Ping(1)))
        );
        assert_eq!(
            rx.recv().await,
            Some(Received::Message(ProtocolMessage::Ping(2)))
        );
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_queue_drops_oldest_on_overflow() {
        let (queue, mut rx) = MessageQueue::new(4);
        for n in 0..10 {
            assert!(queue.push(ProtocolMessage::Ping(n)));
        }

        assert_eq!(rx.recv().await, Some(Received::Lagged(6)));
        for n in 6..10 {
            assert_eq!(
                rx.recv().await,
                Some(Received::Message(ProtocolMessage::Ping(n)))
            );
        }
    }

    #[tokio::test]
    async fn test_queue_closes_when_producer_dropped() {
        let (queue, mut rx) = MessageQueue::new(2);
        assert!(queue.push(ProtocolMessage::Ping(1)));
        drop(queue);

        assert_eq!(
            rx.recv().await,
            Some(Received::Message(ProtocolMessage::Ping(1)))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_queue_push_without_receiver() {
        let (queue, rx) = MessageQueue::new(2);
        drop(rx);
        assert!(!queue.push(ProtocolMessage::Ping(1)));
    }
}

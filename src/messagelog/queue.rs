//! Bounded FIFO between event handlers and the dispatch loop.

use tokio::sync::{mpsc, RwLock};

use crate::common::error::QueueError;
use crate::messagelog::payload::LogMessage;

/// Producer side of the dispatch queue.
///
/// Shared by every event handler. `enqueue` waits while the queue is full.
pub struct DispatchQueue {
    sender: RwLock<Option<mpsc::Sender<LogMessage>>>,
    capacity: usize,
}

/// Consumer side, owned by the dispatch loop.
pub struct DispatchReceiver {
    receiver: mpsc::Receiver<LogMessage>,
}

impl DispatchQueue {
    /// Create a queue holding at most `capacity` undelivered messages.
    pub fn new(capacity: usize) -> (Self, DispatchReceiver) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        let queue = Self {
            sender: RwLock::new(Some(sender)),
            capacity,
        };
        (queue, DispatchReceiver { receiver })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a message, waiting for space if the queue is full.
    ///
    /// Fails once the queue has been closed.
    pub async fn enqueue(&self, message: LogMessage) -> Result<(), QueueError> {
        // Clone out of the lock so a full queue doesn't block `close`
        let sender = self.sender.read().await.clone();

        match sender {
            Some(sender) => sender.send(message).await.map_err(|_| QueueError::Closed),
            None => Err(QueueError::Closed),
        }
    }

    /// Stop accepting messages. Messages already queued are still delivered.
    pub async fn close(&self) {
        self.sender.write().await.take();
    }

    #[cfg(test)]
    pub async fn is_closed(&self) -> bool {
        self.sender.read().await.is_none()
    }
}

impl DispatchReceiver {
    /// Wait for the next message.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn dequeue(&mut self) -> Option<LogMessage> {
        self.receiver.recv().await
    }
}

//! In-process transport for queued mapping writes

use async_trait::async_trait;
use syncbridge_core::MappingRetryQueue;
use syncbridge_domain::{MappingRetryMessage, Result, SyncBridgeError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Receiving half, owned by [`super::MappingRetryWorker`].
pub type RetryReceiver = mpsc::Receiver<MappingRetryMessage>;

/// Bounded channel standing in for a message bus queue.
#[derive(Debug, Clone)]
pub struct InMemoryRetryQueue {
    sender: mpsc::Sender<MappingRetryMessage>,
}

impl InMemoryRetryQueue {
    /// Create a queue and the receiver the worker drains.
    pub fn channel(capacity: usize) -> (Self, RetryReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Put a message back after a failed delivery, waiting for capacity.
    pub async fn redeliver(&self, message: MappingRetryMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| SyncBridgeError::Internal("retry queue closed".into()))
    }

    /// Messages currently waiting.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MappingRetryQueue for InMemoryRetryQueue {
    async fn enqueue(&self, message: MappingRetryMessage) -> Result<()> {
        let id = message.id;
        match self.sender.try_send(message) {
            Ok(()) => {
                debug!(message_id = %id, "mapping write queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                Err(SyncBridgeError::Transient("mapping retry queue is full".into()))
            }
            Err(TrySendError::Closed(_)) => {
                Err(SyncBridgeError::Internal("mapping retry queue closed".into()))
            }
        }
    }
}

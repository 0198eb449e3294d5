//! Consumer of the mapping retry queue.
//!
//! Drains [`InMemoryRetryQueue`], hands each message to the
//! [`MappingRetryProcessor`] and schedules delayed redelivery for messages
//! that should be tried again. Join handles are tracked, cancellation is
//! explicit and stopping waits for the loop with a timeout.
//!
//! Stopping never loses a message: redeliveries still waiting out their delay
//! go back into the channel, and a message that does not fit is dead-lettered.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use syncbridge_infra::queue::{InMemoryRetryQueue, MappingRetryWorker, MappingRetryWorkerConfig};
//!
//! # async fn example(
//! #     processor: Arc<syncbridge_core::MappingRetryProcessor>,
//! # ) -> Result<(), syncbridge_infra::errors::WorkerError> {
//! let (queue, receiver) = InMemoryRetryQueue::channel(1024);
//! let mut worker = MappingRetryWorker::new(
//!     processor,
//!     queue,
//!     receiver,
//!     MappingRetryWorkerConfig { redelivery_delay: Duration::from_secs(30), ..Default::default() },
//! );
//!
//! worker.start()?;
//! // ... application runs ...
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use syncbridge_core::{MappingRetryProcessor, MappingRetryQueue, RetryDisposition};
use syncbridge_domain::{MappingRetryMessage, RetryQueueConfig};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::retry_queue::{InMemoryRetryQueue, RetryReceiver};
use crate::errors::{WorkerError, WorkerResult};

/// Configuration for the mapping retry worker.
#[derive(Debug, Clone)]
pub struct MappingRetryWorkerConfig {
    /// Wait before a failed message is delivered again
    pub redelivery_delay: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for MappingRetryWorkerConfig {
    fn default() -> Self {
        Self { redelivery_delay: Duration::from_secs(30), join_timeout: Duration::from_secs(5) }
    }
}

impl From<&RetryQueueConfig> for MappingRetryWorkerConfig {
    fn from(config: &RetryQueueConfig) -> Self {
        Self {
            redelivery_delay: Duration::from_millis(config.redelivery_delay_ms),
            ..Self::default()
        }
    }
}

/// Mapping retry worker with explicit lifecycle management.
pub struct MappingRetryWorker {
    processor: Arc<MappingRetryProcessor>,
    queue: InMemoryRetryQueue,
    receiver: Option<RetryReceiver>,
    config: MappingRetryWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<RetryReceiver>>,
}

impl MappingRetryWorker {
    pub fn new(
        processor: Arc<MappingRetryProcessor>,
        queue: InMemoryRetryQueue,
        receiver: RetryReceiver,
        config: MappingRetryWorkerConfig,
    ) -> Self {
        Self {
            processor,
            queue,
            receiver: Some(receiver),
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the worker, spawning the consume loop.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> WorkerResult<()> {
        if self.is_running() {
            return Err(WorkerError::AlreadyRunning);
        }
        let receiver = self.receiver.take().ok_or(WorkerError::AlreadyRunning)?;

        self.cancellation = CancellationToken::new();

        let processor = Arc::clone(&self.processor);
        let queue = self.queue.clone();
        let delay = self.config.redelivery_delay;
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::consume_loop(processor, queue, receiver, delay, cancel).await
        });

        self.task_handle = Some(handle);
        info!(redelivery_delay_ms = delay.as_millis() as u64, "Mapping retry worker started");
        Ok(())
    }

    /// Stop the worker and wait for the consume loop to finish.
    ///
    /// Messages still waiting in the channel survive a restart, and pending
    /// delayed redeliveries are put back into it.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> WorkerResult<()> {
        let Some(handle) = self.task_handle.take() else {
            return Err(WorkerError::NotRunning);
        };

        info!("Stopping mapping retry worker");
        self.cancellation.cancel();

        let join_timeout = self.config.join_timeout;
        match tokio::time::timeout(join_timeout, handle).await {
            Ok(Ok(receiver)) => self.receiver = Some(receiver),
            Ok(Err(e)) => {
                warn!(error = %e, "Mapping retry worker task failed");
                return Err(WorkerError::TaskFailed(e.to_string()));
            }
            Err(_) => {
                warn!("Mapping retry worker did not complete within timeout");
                return Err(WorkerError::JoinTimeout { duration: join_timeout });
            }
        }

        info!("Mapping retry worker stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when the consume loop is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn consume_loop(
        processor: Arc<MappingRetryProcessor>,
        queue: InMemoryRetryQueue,
        mut receiver: RetryReceiver,
        delay: Duration,
        cancel: CancellationToken,
    ) -> RetryReceiver {
        let mut redeliveries = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Mapping retry worker loop cancelled");
                    break;
                }
                Some(message) = receiver.recv() => {
                    match processor.process(message).await {
                        RetryDisposition::Completed | RetryDisposition::Duplicate => {}
                        RetryDisposition::DeadLettered => {}
                        RetryDisposition::Requeue(next) => {
                            redeliveries.spawn(Self::redeliver_later(
                                queue.clone(),
                                next,
                                delay,
                                cancel.clone(),
                            ));
                        }
                    }
                }
                Some(joined) = redeliveries.join_next(), if !redeliveries.is_empty() => {
                    match joined {
                        // Cancelled between polls; the loop ends on the next turn.
                        Ok(Some(message)) => {
                            Self::restore(&processor, &queue, message).await;
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "redelivery task failed"),
                    }
                }
                else => break,
            }
        }

        let mut returned = 0usize;
        while let Some(joined) = redeliveries.join_next().await {
            match joined {
                Ok(Some(message)) => {
                    if Self::restore(&processor, &queue, message).await {
                        returned += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "redelivery task failed"),
            }
        }
        if returned > 0 {
            info!(returned, "pending mapping redeliveries returned to the queue");
        }
        receiver
    }

    /// Put an undelivered message back into the channel, dead-lettering it
    /// when the channel is full. Returns whether it went back into the channel.
    async fn restore(
        processor: &MappingRetryProcessor,
        queue: &InMemoryRetryQueue,
        message: MappingRetryMessage,
    ) -> bool {
        match queue.enqueue(message.clone()).await {
            Ok(()) => true,
            Err(e) => {
                let reason = format!("retry queue unavailable at shutdown: {e}");
                processor.dead_letter(message, reason).await;
                false
            }
        }
    }

    /// Wait out the delay, then put `message` back on the queue. Returns the
    /// message instead when cancelled first.
    async fn redeliver_later(
        queue: InMemoryRetryQueue,
        message: MappingRetryMessage,
        delay: Duration,
        cancel: CancellationToken,
    ) -> Option<MappingRetryMessage> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Some(message),
        }

        let id = message.id;
        tokio::select! {
            sent = queue.redeliver(message.clone()) => {
                if let Err(e) = sent {
                    error!(message_id = %id, error = %e, "failed to redeliver mapping write");
                }
                None
            }
            _ = cancel.cancelled() => Some(message),
        }
    }
}

impl Drop for MappingRetryWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("MappingRetryWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

//! Partitioned dispatch of change notifications
//!
//! Notifications are routed to one of N sequential workers by hashing the
//! entity id, so two passes for the same source entity never overlap while
//! unrelated entities proceed in parallel. Manual repairs travel the same
//! route and therefore queue behind in-flight notifications for that id.
//!
//! Notifications are acknowledged before they run, so a pass that fails with a
//! retryable error is redelivered on its own partition after a delay, up to
//! `max_attempts` passes. Stopping the dispatcher finishes every accepted job:
//! queued jobs and pending redeliveries each get one final pass.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use syncbridge_core::SyncOrchestrator;
use syncbridge_domain::{
    ChangeNotification, DispatcherConfig, Result, SyncBridgeError, SyncOutcome,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Anything that can run a synchronization pass.
#[async_trait]
pub trait ChangeHandler: Send + Sync + 'static {
    async fn handle(&self, notification: &ChangeNotification) -> SyncOutcome;

    async fn repair(&self, source_id: &str) -> SyncOutcome;
}

#[async_trait]
impl ChangeHandler for SyncOrchestrator {
    async fn handle(&self, notification: &ChangeNotification) -> SyncOutcome {
        self.synchronize(notification).await
    }

    async fn repair(&self, source_id: &str) -> SyncOutcome {
        SyncOrchestrator::repair(self, source_id).await
    }
}

enum Job {
    /// `attempt` is 1-based.
    Notify { notification: ChangeNotification, attempt: u32 },
    Repair { source_id: String, reply: oneshot::Sender<SyncOutcome> },
}

impl Job {
    fn entity_id(&self) -> &str {
        match self {
            Self::Notify { notification, .. } => &notification.entity_id,
            Self::Repair { source_id, .. } => source_id,
        }
    }
}

/// When and how often a failed pass is run again.
#[derive(Debug, Clone, Copy)]
struct Redelivery {
    max_attempts: u32,
    delay: Duration,
}

impl From<&DispatcherConfig> for Redelivery {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.redelivery_delay_ms),
        }
    }
}

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes notifications to per-partition sequential workers.
pub struct NotificationDispatcher {
    senders: Vec<mpsc::Sender<Job>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancellation: CancellationToken,
}

impl NotificationDispatcher {
    /// Spawn the partition workers.
    pub fn start(handler: Arc<dyn ChangeHandler>, config: &DispatcherConfig) -> Self {
        let partitions = config.partitions.max(1);
        let redelivery = Redelivery::from(config);
        let cancellation = CancellationToken::new();
        let mut senders = Vec::with_capacity(partitions);
        let mut handles = Vec::with_capacity(partitions);

        for partition in 0..partitions {
            let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
            senders.push(sender);
            handles.push(tokio::spawn(partition_loop(
                partition,
                Arc::clone(&handler),
                receiver,
                redelivery,
                cancellation.clone(),
            )));
        }

        info!(partitions, channel_capacity = config.channel_capacity, "notification dispatcher started");
        Self { senders, handles: Mutex::new(handles), cancellation }
    }

    /// Partition index owning `entity_id`.
    pub fn partition_for(&self, entity_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        entity_id.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Accept a notification without waiting; a full partition is a
    /// transient error the caller may report as back-pressure.
    pub fn dispatch(&self, notification: ChangeNotification) -> Result<()> {
        let partition = self.partition_for(&notification.entity_id);
        match self.senders[partition].try_send(Job::Notify { notification, attempt: 1 }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SyncBridgeError::Transient(format!(
                "dispatcher partition {partition} is full"
            ))),
            Err(TrySendError::Closed(_)) => {
                Err(SyncBridgeError::Internal("notification dispatcher is stopped".into()))
            }
        }
    }

    /// Run a repair pass on the partition owning `source_id` and wait for it.
    pub async fn repair(&self, source_id: &str) -> Result<SyncOutcome> {
        let partition = self.partition_for(source_id);
        let (reply, outcome) = oneshot::channel();
        let job = Job::Repair { source_id: source_id.to_string(), reply };

        self.senders[partition]
            .send(job)
            .await
            .map_err(|_| SyncBridgeError::Internal("notification dispatcher is stopped".into()))?;

        outcome
            .await
            .map_err(|_| SyncBridgeError::Internal("repair was dropped before completing".into()))
    }

    /// Stop all partition workers. New jobs are refused; jobs already accepted
    /// run once more before each worker exits.
    pub async fn stop(&self) {
        self.cancellation.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());

        for handle in handles {
            match tokio::time::timeout(STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "dispatcher partition task failed"),
                Err(_) => warn!("dispatcher partition did not stop within timeout"),
            }
        }
        info!("notification dispatcher stopped");
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn partition_loop(
    partition: usize,
    handler: Arc<dyn ChangeHandler>,
    mut receiver: mpsc::Receiver<Job>,
    redelivery: Redelivery,
    cancel: CancellationToken,
) {
    let mut pending: JoinSet<Job> = JoinSet::new();

    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
            Some(joined) = pending.join_next() => match joined {
                Ok(job) => job,
                Err(e) => {
                    warn!(partition, error = %e, "redelivery task failed");
                    continue;
                }
            },
        };

        debug!(partition, entity_id = job.entity_id(), "dispatching job");
        if let Some(retry) = run_job(handler.as_ref(), job, Some(&redelivery)).await {
            let delay = redelivery.delay;
            let cancel = cancel.clone();
            pending.spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    // Released early so shutdown can run it.
                    _ = cancel.cancelled() => {}
                }
                retry
            });
        }
    }

    receiver.close();
    let mut drained = 0usize;
    while let Some(job) = receiver.recv().await {
        run_job(handler.as_ref(), job, None).await;
        drained += 1;
    }
    while let Some(joined) = pending.join_next().await {
        match joined {
            Ok(job) => {
                run_job(handler.as_ref(), job, None).await;
                drained += 1;
            }
            Err(e) => warn!(partition, error = %e, "redelivery task failed"),
        }
    }
    debug!(partition, drained, "dispatcher partition stopped");
}

/// Run one job. Returns the next delivery of a notification whose pass
/// failed with a retryable error, when `redelivery` still allows one.
async fn run_job(
    handler: &dyn ChangeHandler,
    job: Job,
    redelivery: Option<&Redelivery>,
) -> Option<Job> {
    match job {
        Job::Notify { notification, attempt } => {
            let outcome = handler.handle(&notification).await;
            let SyncOutcome::Failed { failure } = outcome else {
                return None;
            };
            if !failure.error.is_retryable() {
                return None;
            }

            match redelivery {
                Some(redelivery) if attempt < redelivery.max_attempts => {
                    warn!(
                        entity_id = %notification.entity_id,
                        event_type = %notification.event_type,
                        attempt,
                        stage = %failure.stage,
                        error = %failure.error,
                        "pass failed, notification will be redelivered"
                    );
                    Some(Job::Notify { notification, attempt: attempt + 1 })
                }
                _ => {
                    error!(
                        entity_id = %notification.entity_id,
                        event_type = %notification.event_type,
                        attempt,
                        stage = %failure.stage,
                        error = %failure.error,
                        "pass failed, notification abandoned"
                    );
                    None
                }
            }
        }
        Job::Repair { source_id, reply } => {
            let outcome = handler.repair(&source_id).await;
            // The requester may have gone away.
            let _ = reply.send(outcome);
            None
        }
    }
}

//! Cron scheduler for reconciliation runs.
//!
//! Triggers a [`ReconciliationJob`] on a cron schedule. Join handles are
//! tracked, cancellation is explicit and every asynchronous operation is
//! wrapped in a timeout. A tick that fires while the previous run is still
//! going is skipped.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use syncbridge_infra::errors::InfraError;
//! use syncbridge_infra::scheduling::{
//!     ReconciliationJob, ReconciliationScheduler, ReconciliationSchedulerConfig, SchedulerResult,
//! };
//!
//! struct NoopJob;
//!
//! #[async_trait]
//! impl ReconciliationJob for NoopJob {
//!     async fn run(&self) -> Result<(), InfraError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> SchedulerResult<()> {
//! let mut scheduler = ReconciliationScheduler::with_config(
//!     ReconciliationSchedulerConfig {
//!         cron_expression: "0 0 2 * * *".into(), // daily at 02:00
//!         ..Default::default()
//!     },
//!     Arc::new(NoopJob),
//! )
//! .await?;
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use syncbridge_core::ReconciliationEngine;
use syncbridge_domain::ReconciliationConfig;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::InfraError;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// A unit of work triggered by the scheduler.
#[async_trait]
pub trait ReconciliationJob: Send + Sync {
    async fn run(&self) -> Result<(), InfraError>;
}

#[async_trait]
impl ReconciliationJob for ReconciliationEngine {
    async fn run(&self) -> Result<(), InfraError> {
        let report = ReconciliationEngine::run(self).await;
        debug!(run_id = %report.run_id, mismatches = report.mismatch_count, "scheduled reconciliation finished");
        Ok(())
    }
}

/// Configuration for the reconciliation scheduler.
#[derive(Debug, Clone)]
pub struct ReconciliationSchedulerConfig {
    /// Six-field cron expression describing the execution schedule.
    pub cron_expression: String,
    /// Timeout applied to a single run.
    pub job_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for ReconciliationSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 0 2 * * *".into(),
            job_timeout: Duration::from_secs(4 * 60 * 60),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ReconciliationConfig> for ReconciliationSchedulerConfig {
    fn from(config: &ReconciliationConfig) -> Self {
        Self { cron_expression: config.cron.clone(), ..Self::default() }
    }
}

/// Reconciliation scheduler with explicit lifecycle management.
pub struct ReconciliationScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    config: ReconciliationSchedulerConfig,
    job_id: Uuid,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    job: Arc<dyn ReconciliationJob>,
    in_progress: Arc<AtomicBool>,
}

impl ReconciliationScheduler {
    /// Create a scheduler with the default timeouts.
    pub async fn new(
        cron_expression: String,
        job: Arc<dyn ReconciliationJob>,
    ) -> SchedulerResult<Self> {
        let config = ReconciliationSchedulerConfig { cron_expression, ..Default::default() };
        Self::with_config(config, job).await
    }

    /// Create a scheduler with a custom configuration.
    pub async fn with_config(
        config: ReconciliationSchedulerConfig,
        job: Arc<dyn ReconciliationJob>,
    ) -> SchedulerResult<Self> {
        let raw_scheduler =
            JobScheduler::new().await.map_err(|e| SchedulerError::CreationFailed(e.to_string()))?;

        let mut scheduler = Self {
            scheduler: Arc::new(RwLock::new(raw_scheduler)),
            config,
            job_id: Uuid::nil(),
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            job,
            in_progress: Arc::new(AtomicBool::new(false)),
        };

        scheduler.job_id = scheduler.register_job().await?;
        Ok(scheduler)
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler = self.scheduler.clone();
        let start_timeout = self.config.start_timeout;
        let start_result = tokio::time::timeout(start_timeout, async move {
            let guard = scheduler.write().await;
            guard.start().await
        })
        .await
        .map_err(|_| SchedulerError::Timeout { duration: start_timeout })?;

        start_result.map_err(|e| SchedulerError::StartFailed(e.to_string()))?;

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_task(cancel).await;
        });

        self.monitor_handle = Some(handle);
        info!(cron = %self.config.cron_expression, "Reconciliation scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let scheduler = self.scheduler.clone();
        let stop_timeout = self.config.stop_timeout;
        let stop_result = tokio::time::timeout(stop_timeout, async move {
            let mut guard = scheduler.write().await;
            guard.shutdown().await
        })
        .await
        .map_err(|_| SchedulerError::Timeout { duration: stop_timeout })?;

        stop_result.map_err(|e| SchedulerError::StopFailed(e.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { duration: join_timeout })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Reconciliation scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when the monitor task is active.
    pub fn is_running(&self) -> bool {
        self.monitor_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn register_job(&mut self) -> SchedulerResult<Uuid> {
        if self.job_id != Uuid::nil() {
            return Ok(self.job_id);
        }

        let cron_expr = self.config.cron_expression.clone();
        let job = self.job.clone();
        let job_timeout = self.config.job_timeout;
        let in_progress = self.in_progress.clone();

        let job_definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let job = job.clone();
            let in_progress = in_progress.clone();

            Box::pin(async move {
                if in_progress.swap(true, Ordering::SeqCst) {
                    warn!("Previous reconciliation still running, skipping this tick");
                    return;
                }
                let started = Instant::now();

                match tokio::time::timeout(job_timeout, job.run()).await {
                    Ok(Ok(())) => {
                        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Scheduled reconciliation finished");
                    }
                    Ok(Err(err)) => {
                        error!(error = ?err, "Scheduled reconciliation failed");
                    }
                    Err(_) => {
                        warn!(timeout_secs = job_timeout.as_secs(), "Scheduled reconciliation timed out");
                    }
                }
                in_progress.store(false, Ordering::SeqCst);
            })
        })
        .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;

        let job_id = job_definition.guid();
        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job_definition)
            .await
            .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered reconciliation job");
        Ok(job_id)
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!("Reconciliation scheduler monitor cancelled");
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ReconciliationScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

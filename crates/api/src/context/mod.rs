//! Application context - dependency injection container
//!
//! Builds every client, service and background worker from [`Config`] and
//! owns their lifecycle.

use std::sync::Arc;

use parking_lot::Mutex;
use syncbridge_core::{
    EntityMapper, MappingRetryProcessor, MappingStore, MismatchClassifier,
    ReconciliationDependencies, ReconciliationEngine, ReconciliationSettings, RetryableCaller,
    SourceSystemClient, SyncDependencies, SyncOrchestrator, TargetSystemClient, TelemetryEvent,
    TelemetrySink,
};
use syncbridge_domain::constants::EVENT_RECONCILIATION_REQUESTED;
use syncbridge_domain::{Config, MismatchReport, Result};
use syncbridge_infra::errors::WorkerError;
use syncbridge_infra::scheduling::ReconciliationJob;
use syncbridge_infra::{
    ChangeHandler, ConfiguredEntityMapper, InMemoryDeadLetterStore, InMemoryRetryQueue,
    MappingRetryWorker, MappingRetryWorkerConfig, MappingServiceClient, NotificationDispatcher,
    ReconciliationScheduler, ReconciliationSchedulerConfig, SourceApiClient, TargetApiClient,
    TracingTelemetry,
};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::utils::health::{ComponentHealth, HealthStatus};

/// Application context - holds all services and workers
pub struct AppContext {
    pub config: Config,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub engine: Arc<ReconciliationEngine>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub retry_queue: InMemoryRetryQueue,
    pub dead_letters: Arc<InMemoryDeadLetterStore>,
    pub telemetry: Arc<dyn TelemetrySink>,

    retry_worker: tokio::sync::Mutex<MappingRetryWorker>,
    scheduler: tokio::sync::Mutex<Option<ReconciliationScheduler>>,
    /// On-demand reconciliation runs still in flight
    reconciliations: Mutex<JoinSet<MismatchReport>>,
}

impl AppContext {
    /// Wire all components and start the background workers (fail-fast).
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let mappings: Arc<dyn MappingStore> =
            Arc::new(MappingServiceClient::from_config(&config.mapping_service)?);
        let source: Arc<dyn SourceSystemClient> =
            Arc::new(SourceApiClient::from_config(&config.source)?);
        let target: Arc<dyn TargetSystemClient> =
            Arc::new(TargetApiClient::from_config(&config.target)?);
        let mapper: Arc<dyn EntityMapper> =
            Arc::new(ConfiguredEntityMapper::new(config.fields.clone()));
        let telemetry: Arc<dyn TelemetrySink> = Arc::new(TracingTelemetry::new());
        let caller = RetryableCaller::from_config(&config.retry)?;

        let (retry_queue, receiver) = InMemoryRetryQueue::channel(config.retry_queue.capacity);
        let dead_letters = Arc::new(InMemoryDeadLetterStore::new());

        let orchestrator = Arc::new(SyncOrchestrator::new(
            SyncDependencies {
                mappings: mappings.clone(),
                source: source.clone(),
                target: target.clone(),
                mapper: mapper.clone(),
                retry_queue: Arc::new(retry_queue.clone()),
                dead_letters: dead_letters.clone(),
                telemetry: telemetry.clone(),
            },
            caller.clone(),
            config.target.system_name.clone(),
        ));

        let engine = Arc::new(ReconciliationEngine::new(
            ReconciliationDependencies {
                mappings,
                source,
                target,
                mapper,
                telemetry: telemetry.clone(),
            },
            caller,
            MismatchClassifier::from_config(&config.normalization),
            ReconciliationSettings::from(&config.reconciliation),
        ));

        let processor = Arc::new(MappingRetryProcessor::new(
            orchestrator.clone(),
            dead_letters.clone(),
            telemetry.clone(),
            config.retry_queue.max_attempts,
        ));
        let mut retry_worker = MappingRetryWorker::new(
            processor,
            retry_queue.clone(),
            receiver,
            MappingRetryWorkerConfig::from(&config.retry_queue),
        );
        retry_worker.start()?;

        let handler: Arc<dyn ChangeHandler> = orchestrator.clone();
        let dispatcher = Arc::new(NotificationDispatcher::start(handler, &config.dispatcher));

        let scheduler = if config.reconciliation.enabled {
            let job: Arc<dyn ReconciliationJob> = engine.clone();
            let mut scheduler = ReconciliationScheduler::with_config(
                ReconciliationSchedulerConfig::from(&config.reconciliation),
                job,
            )
            .await?;
            scheduler.start().await?;
            Some(scheduler)
        } else {
            info!("scheduled reconciliation disabled");
            None
        };

        info!(
            target_system = %config.target.system_name,
            partitions = dispatcher.partitions(),
            "application context initialized"
        );

        Ok(Self {
            config,
            orchestrator,
            engine,
            dispatcher,
            retry_queue,
            dead_letters,
            telemetry,
            retry_worker: tokio::sync::Mutex::new(retry_worker),
            scheduler: tokio::sync::Mutex::new(scheduler),
            reconciliations: Mutex::new(JoinSet::new()),
        })
    }

    /// Start an on-demand reconciliation run in the background.
    ///
    /// Returns the request id carried by the `reconciliation-requested`
    /// event; the report follows as `reconciliation-report`.
    pub fn trigger_reconciliation(&self) -> Uuid {
        let request_id = Uuid::now_v7();
        self.telemetry.emit(
            TelemetryEvent::new(EVENT_RECONCILIATION_REQUESTED).with("requestId", request_id),
        );

        let engine = self.engine.clone();
        let mut runs = self.reconciliations.lock();
        while runs.try_join_next().is_some() {}
        runs.spawn(async move { engine.run().await });

        info!(request_id = %request_id, "reconciliation requested");
        request_id
    }

    /// Check health of all background components
    ///
    /// The service is healthy when the score is at least 0.8. Dead letters
    /// mark the service degraded until repaired.
    pub async fn health_check(&self) -> HealthStatus {
        let mut status = HealthStatus::new();

        status = status.add_component(ComponentHealth::healthy_with(
            "dispatcher",
            format!("{} partitions", self.dispatcher.partitions()),
        ));

        let worker_running = self.retry_worker.lock().await.is_running();
        status = status.add_component(if worker_running {
            ComponentHealth::healthy("retry_worker")
        } else {
            ComponentHealth::unhealthy("retry_worker", "not running")
        });

        let depth = self.retry_queue.len();
        status = status.add_component(if depth < self.config.retry_queue.capacity {
            ComponentHealth::healthy_with("retry_queue", format!("depth {depth}"))
        } else {
            ComponentHealth::unhealthy("retry_queue", format!("full at {depth}"))
        });

        let scheduler = self.scheduler.lock().await;
        status = status.add_component(match scheduler.as_ref() {
            Some(s) if s.is_running() => ComponentHealth::healthy("reconciliation_scheduler"),
            Some(_) => ComponentHealth::unhealthy("reconciliation_scheduler", "not running"),
            None => ComponentHealth::healthy_with("reconciliation_scheduler", "disabled"),
        });
        drop(scheduler);

        let dead = self.dead_letters.len();
        status = status.add_component(if dead == 0 {
            ComponentHealth::healthy("dead_letters")
        } else {
            ComponentHealth::unhealthy("dead_letters", format!("{dead} mapping writes need repair"))
        });

        status.calculate_score();
        status
    }

    /// Stop every background worker. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down application context");

        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            if scheduler.is_running() {
                scheduler.stop().await?;
            }
        }

        let mut runs = std::mem::take(&mut *self.reconciliations.lock());
        if !runs.is_empty() {
            warn!(runs = runs.len(), "aborting in-flight reconciliation runs");
        }
        runs.shutdown().await;

        self.dispatcher.stop().await;

        match self.retry_worker.lock().await.stop().await {
            Ok(()) | Err(WorkerError::NotRunning) => {}
            Err(e) => return Err(e.into()),
        }

        info!("application context stopped");
        Ok(())
    }
}

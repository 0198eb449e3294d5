//! Per-entity synchronization from the source system into the target system
//!
//! Each pass is an explicit stage machine so that a failure is attributed to
//! the stage it happened in. Reads go through [`RetryableCaller::call`];
//! target mutations are attempted once; a mapping write that fails after the
//! target entity was created is handed to the retry queue instead of failing
//! the pass.
//!
//! A dead-lettered mapping write means the target entity exists but no
//! mapping points at it, so [`SyncOrchestrator::repair`] redrives the
//! recorded mapping rather than creating the entity again.

use std::sync::Arc;

use serde_json::Value;
use syncbridge_domain::constants::{
    EVENT_DUPLICATE_MAPPING, EVENT_MAPPING_RETRY_QUEUED, EVENT_SYNC_OUTCOME, MAX_REASON_LENGTH,
};
use syncbridge_domain::{
    ChangeKind, ChangeNotification, DuplicateMapping, Mapping, MappingRetryMessage,
    MappingWriteOutcome, Result, SkipReason, SourceEntity, SyncBridgeError, SyncOutcome,
    SyncStage, TargetId,
};
use tracing::{debug, error, info, instrument, warn};

use super::caller::RetryableCaller;
use super::ports::{
    DeadLetterStore, EntityMapper, MappingRetryQueue, MappingStore, SourceSystemClient,
    TargetSystemClient,
};
use crate::telemetry_ports::{TelemetryEvent, TelemetrySink};

/// Collaborators needed by the orchestrator.
#[derive(Clone)]
pub struct SyncDependencies {
    pub mappings: Arc<dyn MappingStore>,
    pub source: Arc<dyn SourceSystemClient>,
    pub target: Arc<dyn TargetSystemClient>,
    pub mapper: Arc<dyn EntityMapper>,
    pub retry_queue: Arc<dyn MappingRetryQueue>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// Stages of a create pass.
#[derive(Debug)]
enum CreateStage {
    CheckExisting,
    FetchSource,
    Transform(SourceEntity),
    Create(Value),
    SaveMapping(TargetId),
}

/// Stages of an update pass, entered once the mapping is known.
#[derive(Debug)]
enum UpdateStage {
    FetchSource,
    Transform(SourceEntity),
    Update(Value),
}

/// Stages of a delete pass, entered once the mapping is known.
#[derive(Debug)]
enum DeleteStage {
    Delete,
    DeleteMapping,
}

enum Step<S> {
    Next(S),
    Done(SyncOutcome),
}

/// Synchronizes one entity per call.
///
/// Callers must not run two passes for the same source id concurrently; the
/// notification dispatcher guarantees this by routing on the entity id.
pub struct SyncOrchestrator {
    deps: SyncDependencies,
    caller: RetryableCaller,
    target_system: String,
}

impl SyncOrchestrator {
    pub fn new(
        deps: SyncDependencies,
        caller: RetryableCaller,
        target_system: impl Into<String>,
    ) -> Self {
        Self { deps, caller, target_system: target_system.into() }
    }

    pub fn target_system(&self) -> &str {
        &self.target_system
    }

    /// Make the target system match the source for the notified entity.
    #[instrument(skip(self, notification), fields(event_type = %notification.event_type, entity_id = %notification.entity_id))]
    pub async fn synchronize(&self, notification: &ChangeNotification) -> SyncOutcome {
        let outcome = if notification.originated_in(&self.target_system) {
            debug!("ignoring echo of a change written by this engine");
            SyncOutcome::skipped(SkipReason::OriginIsTarget)
        } else {
            match notification.kind() {
                Some(ChangeKind::Create) => {
                    self.run_create(
                        &notification.entity_id,
                        &notification.correlation_ids,
                        CreateStage::CheckExisting,
                    )
                    .await
                }
                Some(ChangeKind::Update) => self.update(&notification.entity_id).await,
                Some(ChangeKind::Delete) => self.delete(&notification.entity_id).await,
                None => {
                    warn!("unsupported event type, ignoring");
                    SyncOutcome::skipped(SkipReason::UnsupportedEvent)
                }
            }
        };

        self.record(&notification.event_type, &notification.entity_id, &outcome);
        outcome
    }

    /// Force one pass for `source_id` outside the notification path.
    ///
    /// A dead letter for the entity is redriven through [`Self::retry_mapping`]
    /// and cleared once the mapping is in place. Without one, the pass updates
    /// when a mapping exists and creates otherwise.
    #[instrument(skip(self))]
    pub async fn repair(&self, source_id: &str) -> SyncOutcome {
        let outcome = match self.deps.dead_letters.find_by_source_id(source_id).await {
            Ok(Some(letter)) => self.redrive(source_id, &letter.message).await,
            Ok(None) => match self.lookup_mapping(source_id).await {
                Ok(Some(mapping)) => self.run_update(source_id, &mapping).await,
                Ok(None) => self.run_create(source_id, &[], CreateStage::FetchSource).await,
                Err(e) => SyncOutcome::failed(SyncStage::LookupMapping, e),
            },
            Err(e) => SyncOutcome::failed(SyncStage::LookupMapping, e),
        };

        self.record("repair", source_id, &outcome);
        outcome
    }

    /// Write a dead-lettered mapping again; the letter is kept when the write fails.
    async fn redrive(&self, source_id: &str, message: &MappingRetryMessage) -> SyncOutcome {
        let target_id = message.mapping.target_id.clone();
        info!(target_id = %target_id, attempt = message.attempt, "redriving dead-lettered mapping");

        let outcome = match self.retry_mapping(message).await {
            MappingWriteOutcome::Created => SyncOutcome::Created { target_id },
            MappingWriteOutcome::Conflict(conflict) => {
                SyncOutcome::DuplicateMapping { orphaned: target_id, existing: conflict.existing }
            }
            MappingWriteOutcome::TransientError(e) | MappingWriteOutcome::PermanentError(e) => {
                return SyncOutcome::failed(SyncStage::SaveMapping, e);
            }
        };

        match self.deps.dead_letters.remove_by_source_id(source_id).await {
            Ok(removed) => debug!(removed, "dead letters cleared"),
            Err(e) => warn!(error = %e, "mapping redriven but dead letter could not be cleared"),
        }
        outcome
    }

    /// Redeliver a mapping write queued by an earlier create pass.
    ///
    /// A conflict with an identical pairing means the earlier write landed
    /// and only its response was lost, so it counts as created.
    #[instrument(skip(self, message), fields(source_id = %message.mapping.source_id, attempt = message.attempt))]
    pub async fn retry_mapping(&self, message: &MappingRetryMessage) -> MappingWriteOutcome {
        match self.write_mapping(&message.mapping).await {
            MappingWriteOutcome::Conflict(conflict)
                if conflict.existing.same_pairing(&message.mapping) =>
            {
                debug!("mapping already present from an earlier delivery");
                MappingWriteOutcome::Created
            }
            MappingWriteOutcome::Conflict(conflict) => {
                self.report_duplicate(&message.mapping.target_id, &conflict);
                MappingWriteOutcome::Conflict(conflict)
            }
            other => other,
        }
    }

    async fn run_create(
        &self,
        source_id: &str,
        correlation_ids: &[String],
        start: CreateStage,
    ) -> SyncOutcome {
        let mut stage = start;
        loop {
            stage = match self.advance_create(stage, source_id, correlation_ids).await {
                Step::Next(next) => next,
                Step::Done(outcome) => return outcome,
            };
        }
    }

    async fn advance_create(
        &self,
        stage: CreateStage,
        source_id: &str,
        correlation_ids: &[String],
    ) -> Step<CreateStage> {
        match stage {
            CreateStage::CheckExisting => match self.lookup_mapping(source_id).await {
                Ok(Some(_)) => Step::Done(SyncOutcome::skipped(SkipReason::AlreadyMapped)),
                Ok(None) => Step::Next(CreateStage::FetchSource),
                Err(e) => Step::Done(SyncOutcome::failed(SyncStage::CheckExisting, e)),
            },
            CreateStage::FetchSource => match self.fetch_source(source_id).await {
                Ok(entity) => Step::Next(CreateStage::Transform(entity)),
                Err(e) if e.is_not_found() => {
                    Step::Done(SyncOutcome::skipped(SkipReason::SourceNotFound))
                }
                Err(e) => Step::Done(SyncOutcome::failed(SyncStage::FetchSource, e)),
            },
            CreateStage::Transform(entity) => match self.deps.mapper.to_target(&entity) {
                Ok(payload) => Step::Next(CreateStage::Create(payload)),
                Err(e) => Step::Done(SyncOutcome::failed(SyncStage::Transform, e)),
            },
            CreateStage::Create(payload) => {
                let call = self.deps.target.create_entity(&payload);
                match self.caller.once("create-target", call).await {
                    Ok(target_id) => Step::Next(CreateStage::SaveMapping(target_id)),
                    Err(e) => Step::Done(SyncOutcome::failed(SyncStage::Create, e)),
                }
            }
            CreateStage::SaveMapping(target_id) => {
                Step::Done(self.save_mapping(source_id, target_id, correlation_ids).await)
            }
        }
    }

    async fn save_mapping(
        &self,
        source_id: &str,
        target_id: TargetId,
        correlation_ids: &[String],
    ) -> SyncOutcome {
        let mapping = Mapping::source_created(source_id, target_id.clone());
        match self.write_mapping(&mapping).await {
            MappingWriteOutcome::Created => SyncOutcome::Created { target_id },
            MappingWriteOutcome::Conflict(conflict) if conflict.existing.same_pairing(&mapping) => {
                SyncOutcome::Created { target_id }
            }
            MappingWriteOutcome::Conflict(conflict) => {
                self.report_duplicate(&target_id, &conflict);
                SyncOutcome::DuplicateMapping { orphaned: target_id, existing: conflict.existing }
            }
            MappingWriteOutcome::TransientError(e) | MappingWriteOutcome::PermanentError(e) => {
                let reason = syncbridge_common::truncate_reason(&e.to_string(), MAX_REASON_LENGTH);
                let message = MappingRetryMessage::new(mapping)
                    .with_error(reason.clone())
                    .with_correlation_ids(correlation_ids.to_vec());

                match self.deps.retry_queue.enqueue(message).await {
                    Ok(()) => {
                        warn!(
                            source_id = %source_id,
                            target_id = %target_id,
                            error = %reason,
                            "mapping write failed after target create, queued for retry"
                        );
                        self.deps.telemetry.emit(
                            TelemetryEvent::new(EVENT_MAPPING_RETRY_QUEUED)
                                .with("sourceId", source_id)
                                .with("targetId", &target_id)
                                .with("error", reason),
                        );
                        SyncOutcome::Created { target_id }
                    }
                    Err(queue_error) => {
                        error!(
                            source_id = %source_id,
                            target_id = %target_id,
                            error = %queue_error,
                            "mapping write failed and could not be queued"
                        );
                        SyncOutcome::failed(SyncStage::SaveMapping, queue_error)
                    }
                }
            }
        }
    }

    async fn update(&self, source_id: &str) -> SyncOutcome {
        match self.lookup_mapping(source_id).await {
            Ok(Some(mapping)) => self.run_update(source_id, &mapping).await,
            Ok(None) => SyncOutcome::skipped(SkipReason::MappingNotFound),
            Err(e) => SyncOutcome::failed(SyncStage::LookupMapping, e),
        }
    }

    async fn run_update(&self, source_id: &str, mapping: &Mapping) -> SyncOutcome {
        let mut stage = UpdateStage::FetchSource;
        loop {
            let step = match stage {
                UpdateStage::FetchSource => match self.fetch_source(source_id).await {
                    Ok(entity) => Step::Next(UpdateStage::Transform(entity)),
                    Err(e) if e.is_not_found() => {
                        Step::Done(SyncOutcome::skipped(SkipReason::SourceNotFound))
                    }
                    Err(e) => Step::Done(SyncOutcome::failed(SyncStage::FetchSource, e)),
                },
                UpdateStage::Transform(entity) => match self.deps.mapper.to_target(&entity) {
                    Ok(payload) => Step::Next(UpdateStage::Update(payload)),
                    Err(e) => Step::Done(SyncOutcome::failed(SyncStage::Transform, e)),
                },
                UpdateStage::Update(payload) => {
                    let call = self.deps.target.update_entity(&mapping.target_id, &payload);
                    match self.caller.once("update-target", call).await {
                        Ok(()) => Step::Done(SyncOutcome::Updated),
                        Err(e) => Step::Done(SyncOutcome::failed(SyncStage::Update, e)),
                    }
                }
            };
            match step {
                Step::Next(next) => stage = next,
                Step::Done(outcome) => return outcome,
            }
        }
    }

    async fn delete(&self, source_id: &str) -> SyncOutcome {
        let mapping = match self.lookup_mapping(source_id).await {
            Ok(Some(mapping)) => mapping,
            Ok(None) => return SyncOutcome::skipped(SkipReason::MappingNotFound),
            Err(e) => return SyncOutcome::failed(SyncStage::LookupMapping, e),
        };

        let mut stage = DeleteStage::Delete;
        loop {
            let step = match stage {
                DeleteStage::Delete => {
                    let call = self.deps.target.delete_entity(&mapping.target_id);
                    match self.caller.once("delete-target", call).await {
                        Ok(()) => Step::Next(DeleteStage::DeleteMapping),
                        Err(e) if e.is_not_found() => {
                            debug!(target_id = %mapping.target_id, "target entity already gone");
                            Step::Next(DeleteStage::DeleteMapping)
                        }
                        Err(e) => Step::Done(SyncOutcome::failed(SyncStage::Delete, e)),
                    }
                }
                DeleteStage::DeleteMapping => {
                    let result = self
                        .caller
                        .call("delete-mapping", || self.deps.mappings.delete_by_source_id(source_id))
                        .await;
                    match result {
                        Ok(()) => Step::Done(SyncOutcome::Deleted),
                        Err(e) if e.is_not_found() => Step::Done(SyncOutcome::Deleted),
                        Err(e) => Step::Done(SyncOutcome::failed(SyncStage::DeleteMapping, e)),
                    }
                }
            };
            match step {
                Step::Next(next) => stage = next,
                Step::Done(outcome) => return outcome,
            }
        }
    }

    async fn lookup_mapping(&self, source_id: &str) -> Result<Option<Mapping>> {
        self.caller
            .call("lookup-mapping", || self.deps.mappings.find_by_source_id(source_id))
            .await
    }

    async fn fetch_source(&self, source_id: &str) -> Result<SourceEntity> {
        self.caller.call("fetch-source", || self.deps.source.get_entity(source_id)).await
    }

    async fn write_mapping(&self, mapping: &Mapping) -> MappingWriteOutcome {
        match tokio::time::timeout(self.caller.call_timeout(), self.deps.mappings.create(mapping))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => MappingWriteOutcome::TransientError(SyncBridgeError::Transient(
                "mapping write timed out".to_string(),
            )),
        }
    }

    fn report_duplicate(&self, orphaned: &TargetId, conflict: &DuplicateMapping) {
        warn!(
            source_id = %conflict.existing.source_id,
            orphaned_target_id = %orphaned,
            existing_target_id = %conflict.existing.target_id,
            "duplicate mapping: existing mapping wins, created target entity is orphaned"
        );
        self.deps.telemetry.emit(
            TelemetryEvent::new(EVENT_DUPLICATE_MAPPING)
                .with("sourceId", &conflict.existing.source_id)
                .with("orphanedTargetId", orphaned)
                .with("existingTargetId", &conflict.existing.target_id),
        );
    }

    fn record(&self, event_type: &str, entity_id: &str, outcome: &SyncOutcome) {
        let mut event = TelemetryEvent::new(EVENT_SYNC_OUTCOME)
            .with("eventType", event_type)
            .with("entityId", entity_id)
            .with("outcome", outcome.label());

        match outcome {
            SyncOutcome::Created { target_id } => {
                info!(entity_id, target_id = %target_id, "entity created in target system");
                event = event.with("targetId", target_id);
            }
            SyncOutcome::Updated | SyncOutcome::Deleted => {
                info!(entity_id, outcome = outcome.label(), "entity synchronized");
            }
            SyncOutcome::Skipped { reason } => {
                debug!(entity_id, reason = %reason, "synchronization skipped");
                event = event.with("reason", reason);
            }
            SyncOutcome::DuplicateMapping { orphaned, .. } => {
                event = event.with("orphanedTargetId", orphaned);
            }
            SyncOutcome::Failed { failure } => {
                error!(entity_id, stage = %failure.stage, error = %failure.error, "synchronization failed");
                event = event
                    .with("stage", failure.stage)
                    .with("errorCategory", failure.error.category())
                    .with(
                        "error",
                        syncbridge_common::truncate_reason(failure.error.message(), MAX_REASON_LENGTH),
                    );
            }
        }

        self.deps.telemetry.emit(event);
    }
}

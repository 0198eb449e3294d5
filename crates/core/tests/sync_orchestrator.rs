//! Integration tests for `SyncOrchestrator` against in-memory collaborators.

mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use support::{
    alert, Harness, InMemoryMappingStore, InMemorySourceSystem, InMemoryTargetSystem,
    PassthroughMapper, RecordingRetryQueue, TARGET_SYSTEM,
};
use syncbridge_domain::constants::{
    EVENT_DUPLICATE_MAPPING, EVENT_MAPPING_RETRY_QUEUED, EVENT_SYNC_OUTCOME,
};
use syncbridge_domain::{
    ChangeNotification, SkipReason, SyncBridgeError, SyncOutcome, SyncStage, TargetId,
};

fn created(id: &str) -> ChangeNotification {
    ChangeNotification::new("prisoner-alerts.alert.created", id)
}

fn updated(id: &str) -> ChangeNotification {
    ChangeNotification::new("prisoner-alerts.alert.updated", id)
}

fn deleted(id: &str) -> ChangeNotification {
    ChangeNotification::new("prisoner-alerts.alert.deleted", id)
}

/// Validates that a create followed by a redelivered create is idempotent.
///
/// Assertions:
/// - First delivery creates one target entity and one mapping.
/// - Second delivery is skipped as already mapped.
/// - The target system saw exactly one create.
#[tokio::test]
async fn redelivered_create_is_idempotent() {
    let harness = Harness::new(
        InMemoryMappingStore::new(),
        InMemorySourceSystem::new().with_entity("a-1", alert("ACTIVE", "first")),
        InMemoryTargetSystem::new(),
    );
    let orchestrator = harness.orchestrator();

    let first = orchestrator.synchronize(&created("a-1")).await;
    let second = orchestrator.synchronize(&created("a-1")).await;

    let SyncOutcome::Created { target_id } = first else {
        panic!("expected created, got {first:?}");
    };
    assert_eq!(second, SyncOutcome::skipped(SkipReason::AlreadyMapped));
    assert_eq!(harness.target.creates(), 1);
    assert_eq!(harness.mappings.len(), 1);
    assert_eq!(harness.mappings.get("a-1").map(|m| m.target_id), Some(target_id));
}

#[tokio::test]
async fn echo_of_own_write_is_ignored() {
    let harness = Harness::new(
        InMemoryMappingStore::new(),
        InMemorySourceSystem::new().with_entity("a-1", alert("ACTIVE", "first")),
        InMemoryTargetSystem::new(),
    );

    let notification = created("a-1").with_origin(TARGET_SYSTEM);
    let outcome = harness.orchestrator().synchronize(&notification).await;

    assert_eq!(outcome, SyncOutcome::skipped(SkipReason::OriginIsTarget));
    assert_eq!(harness.target.mutations(), 0);
    assert_eq!(harness.source.get_calls(), 0);
}

/// Validates the concurrent-create race on the same source id.
///
/// Assertions:
/// - One pass wins with Created, the other reports DuplicateMapping.
/// - Exactly one mapping survives, pointing at the winner's entity.
/// - A duplicate-mapping event names both target ids.
#[tokio::test]
async fn concurrent_creates_leave_one_mapping() {
    let harness = Harness::new(
        InMemoryMappingStore::new(),
        InMemorySourceSystem::new().with_entity("a-1", alert("ACTIVE", "first")),
        InMemoryTargetSystem::new().with_create_delay(Duration::from_millis(20)),
    );
    let orchestrator = harness.orchestrator();

    let notification = created("a-1");
    let (left, right) = tokio::join!(
        orchestrator.synchronize(&notification),
        orchestrator.synchronize(&notification),
    );

    let outcomes = [left, right];
    let winner = outcomes
        .iter()
        .find_map(|o| match o {
            SyncOutcome::Created { target_id } => Some(target_id.clone()),
            _ => None,
        })
        .expect("one pass should create");
    let (orphaned, existing) = outcomes
        .iter()
        .find_map(|o| match o {
            SyncOutcome::DuplicateMapping { orphaned, existing } => {
                Some((orphaned.clone(), existing.clone()))
            }
            _ => None,
        })
        .expect("one pass should hit the duplicate");

    assert_eq!(harness.target.creates(), 2);
    assert_eq!(harness.mappings.len(), 1);
    assert_eq!(existing.target_id, winner);
    assert_ne!(orphaned, winner);

    let events = harness.telemetry.named(EVENT_DUPLICATE_MAPPING);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].property("orphanedTargetId"), Some(orphaned.to_string().as_str()));
    assert_eq!(events[0].property("existingTargetId"), Some(winner.to_string().as_str()));
}

#[tokio::test]
async fn unsupported_event_is_skipped() {
    let harness = Harness::new(
        InMemoryMappingStore::new(),
        InMemorySourceSystem::new(),
        InMemoryTargetSystem::new(),
    );

    let notification = ChangeNotification::new("prisoner-alerts.alert.merged", "a-1");
    let outcome = harness.orchestrator().synchronize(&notification).await;

    assert_eq!(outcome, SyncOutcome::skipped(SkipReason::UnsupportedEvent));
    assert_eq!(harness.target.mutations(), 0);
}

#[tokio::test]
async fn update_and_delete_without_mapping_are_skipped() {
    let harness = Harness::new(
        InMemoryMappingStore::new(),
        InMemorySourceSystem::new().with_entity("a-1", alert("ACTIVE", "first")),
        InMemoryTargetSystem::new(),
    );
    let orchestrator = harness.orchestrator();

    assert_eq!(
        orchestrator.synchronize(&updated("a-1")).await,
        SyncOutcome::skipped(SkipReason::MappingNotFound)
    );
    assert_eq!(
        orchestrator.synchronize(&deleted("a-1")).await,
        SyncOutcome::skipped(SkipReason::MappingNotFound)
    );
    assert_eq!(harness.target.mutations(), 0);
}

#[tokio::test]
async fn update_overwrites_mapped_target() {
    let harness = Harness::new(
        InMemoryMappingStore::new().with_mapping("a-1", 7),
        InMemorySourceSystem::new().with_entity("a-1", alert("INACTIVE", "closed")),
        InMemoryTargetSystem::new().with_entity(7, alert("ACTIVE", "open")),
    );

    let outcome = harness.orchestrator().synchronize(&updated("a-1")).await;

    assert_eq!(outcome, SyncOutcome::Updated);
    assert_eq!(harness.target.get(7), Some(alert("INACTIVE", "closed")));
}

/// Validates that a delete whose target entity is already gone still
/// removes the mapping.
///
/// Assertions:
/// - Outcome is Deleted.
/// - The mapping no longer exists.
#[tokio::test]
async fn delete_with_missing_target_removes_mapping() {
    let harness = Harness::new(
        InMemoryMappingStore::new().with_mapping("a-1", 7),
        InMemorySourceSystem::new(),
        InMemoryTargetSystem::new(),
    );

    let outcome = harness.orchestrator().synchronize(&deleted("a-1")).await;

    assert_eq!(outcome, SyncOutcome::Deleted);
    assert!(harness.mappings.get("a-1").is_none());
    assert_eq!(harness.target.delete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn vanished_source_entity_skips_create() {
    let harness = Harness::new(
        InMemoryMappingStore::new(),
        InMemorySourceSystem::new(),
        InMemoryTargetSystem::new(),
    );

    let outcome = harness.orchestrator().synchronize(&created("gone")).await;

    assert_eq!(outcome, SyncOutcome::skipped(SkipReason::SourceNotFound));
    assert_eq!(harness.target.creates(), 0);
}

#[tokio::test]
async fn target_create_failure_is_reported_at_create_stage() {
    let harness = Harness::new(
        InMemoryMappingStore::new(),
        InMemorySourceSystem::new().with_entity("a-1", alert("ACTIVE", "first")),
        InMemoryTargetSystem::new().with_failing_creates(),
    );

    let outcome = harness.orchestrator().synchronize(&created("a-1")).await;

    let SyncOutcome::Failed { failure } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(failure.stage, SyncStage::Create);
    assert!(matches!(failure.error, SyncBridgeError::Permanent(_)));
    assert_eq!(harness.mappings.len(), 0);

    let events = harness.telemetry.named(EVENT_SYNC_OUTCOME);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].property("stage"), Some("create"));
}

#[tokio::test]
async fn transform_failure_is_reported_at_transform_stage() {
    let harness = Harness::new(
        InMemoryMappingStore::new(),
        InMemorySourceSystem::new().with_entity("a-1", json!({ "status": "ACTIVE" })),
        InMemoryTargetSystem::new(),
    )
    .with_mapper(PassthroughMapper { fail_transform: true });

    let outcome = harness.orchestrator().synchronize(&created("a-1")).await;

    assert!(matches!(
        outcome,
        SyncOutcome::Failed { ref failure } if failure.stage == SyncStage::Transform
    ));
    assert_eq!(harness.target.creates(), 0);
}

/// Validates that a mapping write failure after the target entity exists
/// does not fail the pass.
///
/// Assertions:
/// - Outcome is Created with the new target id.
/// - One retry message is queued carrying that pairing at attempt 1.
/// - A retry-queued event is emitted.
#[tokio::test]
async fn mapping_write_failure_is_queued_for_retry() {
    let harness = Harness::new(
        InMemoryMappingStore::new().with_failing_creates(1),
        InMemorySourceSystem::new().with_entity("a-1", alert("ACTIVE", "first")),
        InMemoryTargetSystem::new(),
    );

    let notification = created("a-1").with_correlation_id("corr-1");
    let outcome = harness.orchestrator().synchronize(&notification).await;

    let SyncOutcome::Created { target_id } = outcome else {
        panic!("expected created, got {outcome:?}");
    };
    let queued = harness.queue.messages();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].mapping.source_id, "a-1");
    assert_eq!(queued[0].mapping.target_id, target_id);
    assert_eq!(queued[0].attempt, 1);
    assert_eq!(queued[0].correlation_ids, vec!["corr-1".to_string()]);
    assert!(harness.mappings.get("a-1").is_none());
    assert_eq!(harness.telemetry.named(EVENT_MAPPING_RETRY_QUEUED).len(), 1);
}

#[tokio::test]
async fn unqueueable_mapping_write_fails_the_pass() {
    let harness = Harness::new(
        InMemoryMappingStore::new().with_permanent_create_failure(),
        InMemorySourceSystem::new().with_entity("a-1", alert("ACTIVE", "first")),
        InMemoryTargetSystem::new(),
    )
    .with_queue(RecordingRetryQueue::failing());

    let outcome = harness.orchestrator().synchronize(&created("a-1")).await;

    assert!(matches!(
        outcome,
        SyncOutcome::Failed { ref failure } if failure.stage == SyncStage::SaveMapping
    ));
}

#[tokio::test]
async fn repair_creates_unmapped_and_updates_mapped() {
    let harness = Harness::new(
        InMemoryMappingStore::new().with_mapping("a-2", 9),
        InMemorySourceSystem::new()
            .with_entity("a-1", alert("ACTIVE", "first"))
            .with_entity("a-2", alert("INACTIVE", "second")),
        InMemoryTargetSystem::new().with_entity(9, alert("ACTIVE", "second")),
    );
    let orchestrator = harness.orchestrator();

    let repaired = orchestrator.repair("a-1").await;
    assert!(matches!(repaired, SyncOutcome::Created { .. }));
    assert!(harness.mappings.get("a-1").is_some());

    assert_eq!(orchestrator.repair("a-2").await, SyncOutcome::Updated);
    assert_eq!(harness.target.get(9), Some(alert("INACTIVE", "second")));
    assert_eq!(harness.mappings.get("a-2").map(|m| m.target_id), Some(TargetId::Numeric(9)));
}

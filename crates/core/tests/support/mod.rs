//! Shared test helpers for `syncbridge-core` integration tests.
//!
//! In-memory fakes for every core port plus a harness that wires them into
//! an orchestrator and a reconciliation engine.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use syncbridge_common::resilience::RetryConfig;
use syncbridge_core::{
    DeadLetterStore, EntityMapper, MappingRetryProcessor, MappingRetryQueue, MappingStore,
    MismatchClassifier, ReconciliationDependencies, ReconciliationEngine, ReconciliationSettings,
    RetryableCaller, SourceSystemClient, SyncDependencies, SyncOrchestrator, TargetSystemClient,
    TelemetryEvent, TelemetrySink,
};
use syncbridge_domain::{
    DeadLetter, DuplicateMapping, EntitySummary, Mapping, MappingRetryMessage,
    MappingWriteOutcome, NormalizationConfig, Page, Result, SourceEntity, SourceEntityRef,
    SyncBridgeError, TargetEntity, TargetEntityRef, TargetId,
};

pub const TARGET_SYSTEM: &str = "NOMIS";

/// Caller with millisecond backoff so retry paths stay fast.
pub fn fast_caller() -> RetryableCaller {
    let config = RetryConfig::builder()
        .max_attempts(3)
        .fixed_backoff(Duration::from_millis(1))
        .no_jitter()
        .build()
        .expect("valid retry config");
    RetryableCaller::new(config, Duration::from_secs(2))
}

// ============================================================================
// Mapping store
// ============================================================================

/// In-memory mapping service enforcing one mapping per source id.
#[derive(Default)]
pub struct InMemoryMappingStore {
    mappings: Mutex<BTreeMap<String, Mapping>>,
    failing_creates: AtomicU32,
    permanent_failure: Mutex<bool>,
    create_calls: AtomicU32,
    failing_lookups: Mutex<HashSet<String>>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` creates with a transient error.
    pub fn with_failing_creates(self, count: u32) -> Self {
        self.failing_creates.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every create with a permanent error.
    pub fn with_permanent_create_failure(self) -> Self {
        *self.permanent_failure.lock() = true;
        self
    }

    /// Clear every injected create failure.
    pub fn recover(&self) {
        *self.permanent_failure.lock() = false;
        self.failing_creates.store(0, Ordering::SeqCst);
    }

    pub fn with_mapping(self, source_id: &str, target_id: impl Into<TargetId>) -> Self {
        self.insert(Mapping::source_created(source_id, target_id.into()));
        self
    }

    /// Lookups for `source_id` always fail with a transient error.
    pub fn with_failing_lookup(self, source_id: &str) -> Self {
        self.failing_lookups.lock().insert(source_id.to_string());
        self
    }

    pub fn insert(&self, mapping: Mapping) {
        self.mappings.lock().insert(mapping.source_id.clone(), mapping);
    }

    pub fn get(&self, source_id: &str) -> Option<Mapping> {
        self.mappings.lock().get(source_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.mappings.lock().len()
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<Mapping>> {
        if self.failing_lookups.lock().contains(source_id) {
            return Err(SyncBridgeError::Transient(format!("lookup {source_id} failed")));
        }
        Ok(self.get(source_id))
    }

    async fn create(&self, mapping: &Mapping) -> MappingWriteOutcome {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        if *self.permanent_failure.lock() {
            return MappingWriteOutcome::PermanentError(SyncBridgeError::Permanent(
                "400 invalid mapping".into(),
            ));
        }
        let remaining = self.failing_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_creates.store(remaining - 1, Ordering::SeqCst);
            return MappingWriteOutcome::TransientError(SyncBridgeError::Transient(
                "503 mapping service unavailable".into(),
            ));
        }

        let mut mappings = self.mappings.lock();
        if let Some(existing) = mappings.get(&mapping.source_id) {
            return MappingWriteOutcome::Conflict(DuplicateMapping {
                duplicate: mapping.clone(),
                existing: existing.clone(),
            });
        }
        mappings.insert(mapping.source_id.clone(), mapping.clone());
        MappingWriteOutcome::Created
    }

    async fn delete_by_source_id(&self, source_id: &str) -> Result<()> {
        self.mappings.lock().remove(source_id);
        Ok(())
    }
}

// ============================================================================
// Source system
// ============================================================================

/// In-memory source API ordered by entity id.
#[derive(Default)]
pub struct InMemorySourceSystem {
    entities: Mutex<BTreeMap<String, (SourceEntity, Option<String>)>>,
    failing_gets: Mutex<HashSet<String>>,
    failing_pages: Mutex<HashSet<u64>>,
    failing_count: Mutex<bool>,
    get_calls: AtomicU32,
}

impl InMemorySourceSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(self, id: &str, payload: Value) -> Self {
        self.entities
            .lock()
            .insert(id.to_string(), (SourceEntity { id: id.to_string(), payload }, None));
        self
    }

    pub fn with_partitioned_entity(self, id: &str, partition: &str, payload: Value) -> Self {
        self.entities.lock().insert(
            id.to_string(),
            (SourceEntity { id: id.to_string(), payload }, Some(partition.to_string())),
        );
        self
    }

    /// Fetching `id` always fails with a transient error.
    pub fn with_failing_get(self, id: &str) -> Self {
        self.failing_gets.lock().insert(id.to_string());
        self
    }

    pub fn with_failing_page(self, page: u64) -> Self {
        self.failing_pages.lock().insert(page);
        self
    }

    /// Reading the dataset total always fails.
    pub fn with_failing_count(self) -> Self {
        *self.failing_count.lock() = true;
        self
    }

    pub fn remove(&self, id: &str) {
        self.entities.lock().remove(id);
    }

    pub fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceSystemClient for InMemorySourceSystem {
    async fn get_entity(&self, id: &str) -> Result<SourceEntity> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_gets.lock().contains(id) {
            return Err(SyncBridgeError::Transient(format!("source {id} timed out")));
        }
        self.entities
            .lock()
            .get(id)
            .map(|(entity, _)| entity.clone())
            .ok_or_else(|| SyncBridgeError::NotFound(format!("source entity {id}")))
    }

    async fn count_entities(&self) -> Result<u64> {
        if *self.failing_count.lock() {
            return Err(SyncBridgeError::Transient("source count timed out".into()));
        }
        Ok(self.entities.lock().len() as u64)
    }

    async fn list_entities(&self, page: u64, size: u64) -> Result<Page<SourceEntityRef>> {
        if self.failing_pages.lock().contains(&page) {
            return Err(SyncBridgeError::Transient(format!("source page {page} failed")));
        }
        let entities = self.entities.lock();
        let content = entities
            .iter()
            .skip((page * size) as usize)
            .take(size as usize)
            .map(|(id, (_, partition))| SourceEntityRef {
                id: id.clone(),
                partition: partition.clone(),
            })
            .collect();
        Ok(Page { content, total_elements: entities.len() as u64 })
    }
}

// ============================================================================
// Target system
// ============================================================================

/// In-memory legacy system assigning numeric ids.
pub struct InMemoryTargetSystem {
    entities: Mutex<BTreeMap<i64, Value>>,
    next_id: AtomicI64,
    create_delay: Option<Duration>,
    fail_creates: bool,
    failing_gets: Mutex<HashSet<i64>>,
    pub create_calls: AtomicU32,
    pub update_calls: AtomicU32,
    pub delete_calls: AtomicU32,
}

impl Default for InMemoryTargetSystem {
    fn default() -> Self {
        Self {
            entities: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1000),
            create_delay: None,
            fail_creates: false,
            failing_gets: Mutex::new(HashSet::new()),
            create_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
            delete_calls: AtomicU32::new(0),
        }
    }
}

impl InMemoryTargetSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates suspend for `delay`, letting concurrent passes interleave.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn with_failing_creates(mut self) -> Self {
        self.fail_creates = true;
        self
    }

    pub fn with_entity(self, id: i64, payload: Value) -> Self {
        self.entities.lock().insert(id, payload);
        self
    }

    pub fn with_failing_get(self, id: i64) -> Self {
        self.failing_gets.lock().insert(id);
        self
    }

    pub fn get(&self, id: i64) -> Option<Value> {
        self.entities.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    pub fn creates(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }
}

fn numeric(id: &TargetId) -> Result<i64> {
    match id {
        TargetId::Numeric(value) => Ok(*value),
        TargetId::Text(text) => {
            text.parse().map_err(|_| SyncBridgeError::Permanent(format!("bad target id {text}")))
        }
    }
}

#[async_trait]
impl TargetSystemClient for InMemoryTargetSystem {
    async fn get_entity(&self, id: &TargetId) -> Result<TargetEntity> {
        let key = numeric(id)?;
        if self.failing_gets.lock().contains(&key) {
            return Err(SyncBridgeError::Transient(format!("target {key} returned 503")));
        }
        self.entities
            .lock()
            .get(&key)
            .map(|payload| TargetEntity { id: id.clone(), payload: payload.clone() })
            .ok_or_else(|| SyncBridgeError::NotFound(format!("target entity {key}")))
    }

    async fn create_entity(&self, payload: &Value) -> Result<TargetId> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_creates {
            return Err(SyncBridgeError::Permanent("400 validation failed".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entities.lock().insert(id, payload.clone());
        Ok(TargetId::Numeric(id))
    }

    async fn update_entity(&self, id: &TargetId, payload: &Value) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let key = numeric(id)?;
        let mut entities = self.entities.lock();
        match entities.get_mut(&key) {
            Some(existing) => {
                *existing = payload.clone();
                Ok(())
            }
            None => Err(SyncBridgeError::NotFound(format!("target entity {key}"))),
        }
    }

    async fn delete_entity(&self, id: &TargetId) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let key = numeric(id)?;
        match self.entities.lock().remove(&key) {
            Some(_) => Ok(()),
            None => Err(SyncBridgeError::NotFound(format!("target entity {key}"))),
        }
    }

    async fn list_ids(&self, page: u64, size: u64) -> Result<Page<TargetEntityRef>> {
        let entities = self.entities.lock();
        let content = entities
            .keys()
            .skip((page * size) as usize)
            .take(size as usize)
            .map(|id| TargetEntityRef { id: TargetId::Numeric(*id) })
            .collect();
        Ok(Page { content, total_elements: entities.len() as u64 })
    }
}

// ============================================================================
// Mapper
// ============================================================================

/// Copies payloads unchanged and reads `status`, `codes` and `comment`.
#[derive(Default)]
pub struct PassthroughMapper {
    pub fail_transform: bool,
}

fn summarize(payload: &Value) -> EntitySummary {
    let mut summary = EntitySummary {
        status: payload.get("status").and_then(Value::as_str).map(str::to_string),
        codes: payload.get("codes").and_then(Value::as_array).map(|codes| {
            codes.iter().filter_map(Value::as_str).map(str::to_string).collect()
        }),
        ..EntitySummary::default()
    };
    if let Some(comment) = payload.get("comment").and_then(Value::as_str) {
        summary = summary.with_detail("comment", comment);
    }
    summary
}

impl EntityMapper for PassthroughMapper {
    fn to_target(&self, source: &SourceEntity) -> Result<Value> {
        if self.fail_transform {
            return Err(SyncBridgeError::Permanent("unmappable entity".into()));
        }
        Ok(source.payload.clone())
    }

    fn summarize_source(&self, source: &SourceEntity) -> EntitySummary {
        summarize(&source.payload)
    }

    fn summarize_target(&self, target: &TargetEntity) -> EntitySummary {
        summarize(&target.payload)
    }
}

pub fn alert(status: &str, comment: &str) -> Value {
    json!({ "status": status, "codes": ["RNP"], "comment": comment })
}

// ============================================================================
// Queue, dead letters, telemetry
// ============================================================================

#[derive(Default)]
pub struct RecordingRetryQueue {
    messages: Mutex<Vec<MappingRetryMessage>>,
    fail: bool,
}

impl RecordingRetryQueue {
    pub fn failing() -> Self {
        Self { messages: Mutex::new(Vec::new()), fail: true }
    }

    pub fn messages(&self) -> Vec<MappingRetryMessage> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl MappingRetryQueue for RecordingRetryQueue {
    async fn enqueue(&self, message: MappingRetryMessage) -> Result<()> {
        if self.fail {
            return Err(SyncBridgeError::Internal("retry queue closed".into()));
        }
        self.messages.lock().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
}

impl RecordingDeadLetters {
    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }
}

#[async_trait]
impl DeadLetterStore for RecordingDeadLetters {
    async fn store(&self, letter: DeadLetter) -> Result<()> {
        self.letters.lock().push(letter);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.letters.lock().clone())
    }

    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<DeadLetter>> {
        Ok(self
            .letters
            .lock()
            .iter()
            .rev()
            .find(|letter| letter.message.mapping.source_id == source_id)
            .cloned())
    }

    async fn remove_by_source_id(&self, source_id: &str) -> Result<usize> {
        let mut letters = self.letters.lock();
        let before = letters.len();
        letters.retain(|letter| letter.message.mapping.source_id != source_id);
        Ok(before - letters.len())
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.events.lock().iter().filter(|event| event.name == name).cloned().collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

// ============================================================================
// Harness
// ============================================================================

/// All fakes plus the services built on them.
pub struct Harness {
    pub mappings: Arc<InMemoryMappingStore>,
    pub source: Arc<InMemorySourceSystem>,
    pub target: Arc<InMemoryTargetSystem>,
    pub mapper: Arc<PassthroughMapper>,
    pub queue: Arc<RecordingRetryQueue>,
    pub dead_letters: Arc<RecordingDeadLetters>,
    pub telemetry: Arc<RecordingTelemetry>,
}

impl Harness {
    pub fn new(
        mappings: InMemoryMappingStore,
        source: InMemorySourceSystem,
        target: InMemoryTargetSystem,
    ) -> Self {
        Self {
            mappings: Arc::new(mappings),
            source: Arc::new(source),
            target: Arc::new(target),
            mapper: Arc::new(PassthroughMapper::default()),
            queue: Arc::new(RecordingRetryQueue::default()),
            dead_letters: Arc::new(RecordingDeadLetters::default()),
            telemetry: Arc::new(RecordingTelemetry::default()),
        }
    }

    pub fn with_mapper(mut self, mapper: PassthroughMapper) -> Self {
        self.mapper = Arc::new(mapper);
        self
    }

    pub fn with_queue(mut self, queue: RecordingRetryQueue) -> Self {
        self.queue = Arc::new(queue);
        self
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            SyncDependencies {
                mappings: self.mappings.clone(),
                source: self.source.clone(),
                target: self.target.clone(),
                mapper: self.mapper.clone(),
                retry_queue: self.queue.clone(),
                dead_letters: self.dead_letters.clone(),
                telemetry: self.telemetry.clone(),
            },
            fast_caller(),
            TARGET_SYSTEM,
        )
    }

    pub fn retry_processor(&self, max_attempts: u32) -> MappingRetryProcessor {
        MappingRetryProcessor::new(
            Arc::new(self.orchestrator()),
            self.dead_letters.clone(),
            self.telemetry.clone(),
            max_attempts,
        )
    }

    pub fn engine(&self, page_size: u64, excluded_partitions: &[&str]) -> ReconciliationEngine {
        ReconciliationEngine::new(
            ReconciliationDependencies {
                mappings: self.mappings.clone(),
                source: self.source.clone(),
                target: self.target.clone(),
                mapper: self.mapper.clone(),
                telemetry: self.telemetry.clone(),
            },
            fast_caller(),
            MismatchClassifier::from_config(&NormalizationConfig::default()),
            ReconciliationSettings {
                page_size,
                excluded_partitions: excluded_partitions.iter().map(|p| p.to_string()).collect(),
            },
        )
    }
}

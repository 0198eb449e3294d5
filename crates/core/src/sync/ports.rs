//! Port interfaces for entity synchronization

use async_trait::async_trait;
use serde_json::Value;
use syncbridge_domain::{
    DeadLetter, EntitySummary, Mapping, MappingRetryMessage, MappingWriteOutcome, Page, Result,
    SourceEntity, SourceEntityRef, TargetEntity, TargetEntityRef, TargetId,
};

/// Cross-system ID mapping service
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Look up the mapping for a source entity; `Ok(None)` when absent.
    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<Mapping>>;

    /// Insert a mapping. A duplicate is reported as
    /// [`MappingWriteOutcome::Conflict`], never as an error.
    async fn create(&self, mapping: &Mapping) -> MappingWriteOutcome;

    /// Remove the mapping for a source entity.
    async fn delete_by_source_id(&self, source_id: &str) -> Result<()>;
}

/// Source-of-truth API
#[async_trait]
pub trait SourceSystemClient: Send + Sync {
    /// Fetch one entity; `SyncBridgeError::NotFound` when it does not exist.
    async fn get_entity(&self, id: &str) -> Result<SourceEntity>;

    /// One page of the dataset listing. `page` is zero-based.
    async fn list_entities(&self, page: u64, size: u64) -> Result<Page<SourceEntityRef>>;

    /// Authoritative dataset size.
    async fn count_entities(&self) -> Result<u64> {
        Ok(self.list_entities(0, 1).await?.total_elements)
    }
}

/// Legacy target system
#[async_trait]
pub trait TargetSystemClient: Send + Sync {
    async fn get_entity(&self, id: &TargetId) -> Result<TargetEntity>;

    /// Create an entity and return the id the target system assigned.
    async fn create_entity(&self, payload: &Value) -> Result<TargetId>;

    async fn update_entity(&self, id: &TargetId, payload: &Value) -> Result<()>;

    async fn delete_entity(&self, id: &TargetId) -> Result<()>;

    /// One page of the target id listing. `page` is zero-based.
    async fn list_ids(&self, page: u64, size: u64) -> Result<Page<TargetEntityRef>>;
}

/// Entity-specific transformation rules
pub trait EntityMapper: Send + Sync {
    /// Shape a source entity into the target system's request body.
    fn to_target(&self, source: &SourceEntity) -> Result<Value>;

    fn summarize_source(&self, source: &SourceEntity) -> EntitySummary;

    fn summarize_target(&self, target: &TargetEntity) -> EntitySummary;
}

/// Asynchronous redelivery of failed mapping writes
#[async_trait]
pub trait MappingRetryQueue: Send + Sync {
    /// Hand a message to the queue without waiting for its delivery.
    async fn enqueue(&self, message: MappingRetryMessage) -> Result<()>;
}

/// Destination for mapping writes that were given up on
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn store(&self, letter: DeadLetter) -> Result<()>;

    async fn list(&self) -> Result<Vec<DeadLetter>>;

    /// Most recent dead letter recorded for a source entity.
    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<DeadLetter>>;

    /// Drop every dead letter for a source entity, returning how many were held.
    async fn remove_by_source_id(&self, source_id: &str) -> Result<usize>;
}

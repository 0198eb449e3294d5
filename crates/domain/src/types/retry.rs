//! Deferred mapping writes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mapping::Mapping;

/// A mapping write that failed after its target entity was created, queued
/// for asynchronous redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRetryMessage {
    pub id: Uuid,
    pub mapping: Mapping,
    /// 1-based delivery attempt
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub correlation_ids: Vec<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl MappingRetryMessage {
    pub fn new(mapping: Mapping) -> Self {
        Self {
            id: Uuid::now_v7(),
            mapping,
            attempt: 1,
            last_error: None,
            correlation_ids: Vec::new(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    pub fn with_correlation_ids(mut self, ids: Vec<String>) -> Self {
        self.correlation_ids = ids;
        self
    }

    /// Copy of this message for the next delivery.
    pub fn next_attempt(&self, error: impl Into<String>) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            last_error: Some(error.into()),
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// A mapping write that was given up on. Each one leaves a target entity
/// with no mapping and needs manual repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub message: MappingRetryMessage,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(message: MappingRetryMessage, reason: impl Into<String>) -> Self {
        Self { message, reason: reason.into(), dead_lettered_at: Utc::now() }
    }
}

//! Cross-system ID mapping records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SyncBridgeError;

/// Identifier of an entity in the target (legacy) system.
///
/// Legacy resources are keyed either by a numeric sequence or by an opaque
/// string, so both shapes are accepted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetId {
    Numeric(i64),
    Text(String),
}

impl TargetId {
    /// Canonical string form, used for URL paths and set membership.
    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for TargetId {
    fn from(value: i64) -> Self {
        Self::Numeric(value)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// How a mapping came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingType {
    /// Entity created in the source system and mirrored by this engine
    SourceCreated,
    /// Entity created directly in the target system
    TargetCreated,
    /// Entity carried over by a bulk migration
    Migrated,
}

/// Record asserting that a source entity and a target entity are the same
/// real-world fact. At most one mapping exists per `source_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub source_id: String,
    pub target_id: TargetId,
    pub mapping_type: MappingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Mapping {
    /// Mapping for an entity this engine just created in the target system.
    pub fn source_created(source_id: impl Into<String>, target_id: TargetId) -> Self {
        Self {
            source_id: source_id.into(),
            target_id,
            mapping_type: MappingType::SourceCreated,
            created_at: Some(Utc::now()),
        }
    }

    /// Two mappings describe the same pairing regardless of type or timestamp.
    pub fn same_pairing(&self, other: &Self) -> bool {
        self.source_id == other.source_id && self.target_id == other.target_id
    }
}

/// Diagnostic payload returned by the mapping service on a 409.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMapping {
    /// The mapping that was rejected
    pub duplicate: Mapping,
    /// The mapping already stored for the same source id
    pub existing: Mapping,
}

/// Result of a mapping insert.
///
/// Conflicts are a value, not an error, so callers must handle the
/// duplicate-mapping race explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingWriteOutcome {
    Created,
    Conflict(DuplicateMapping),
    TransientError(SyncBridgeError),
    PermanentError(SyncBridgeError),
}

impl MappingWriteOutcome {
    /// Classify a failed write by its error category.
    pub fn from_error(error: SyncBridgeError) -> Self {
        if error.is_retryable() {
            Self::TransientError(error)
        } else {
            Self::PermanentError(error)
        }
    }
}

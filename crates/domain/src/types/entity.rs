//! Entity payloads exchanged with the source and target systems

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::mapping::TargetId;

/// Full entity as held by the source system.
///
/// The payload is opaque to the engine; per-entity field mapping is the job
/// of an `EntityMapper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntity {
    pub id: String,
    pub payload: serde_json::Value,
}

/// Full entity as held by the target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntity {
    pub id: TargetId,
    pub payload: serde_json::Value,
}

/// Lightweight listing entry returned when paging the source dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntityRef {
    pub id: String,
    /// Logical partition (e.g. owning establishment); used by the
    /// reconciliation allow-list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl SourceEntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), partition: None }
    }

    pub fn in_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }
}

/// Lightweight listing entry returned when paging the target dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntityRef {
    pub id: TargetId,
}

/// One page of a listing plus the dataset size reported with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
}

/// Comparable projection of an entity, produced on both sides so the
/// classifier never sees system-specific shapes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Code collection; `None` means the system omitted it entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codes: Option<Vec<String>>,
    /// Count reported without the underlying list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_count: Option<u32>,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl EntitySummary {
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_code_count(mut self, count: u32) -> Self {
        self.code_count = Some(count);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

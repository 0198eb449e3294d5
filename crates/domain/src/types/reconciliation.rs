//! Reconciliation run types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mapping::TargetId;

/// Fixed `(offset, size)` window over a dataset whose total was read once at
/// the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetPage {
    /// Zero-based page number
    pub index: u64,
    pub offset: u64,
    pub size: u64,
}

impl DatasetPage {
    /// Partition `[0, total)` into consecutive pages of `page_size`. The last
    /// page may be short. A zero page size yields no pages.
    pub fn partition(total: u64, page_size: u64) -> Vec<Self> {
        if page_size == 0 {
            return Vec::new();
        }
        let count = total.div_ceil(page_size);
        (0..count)
            .map(|index| {
                let offset = index * page_size;
                Self { index, offset, size: page_size.min(total - offset) }
            })
            .collect()
    }
}

/// Single reason code attached to a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchReason {
    /// Source entity has no mapping
    MappingMissing,
    /// Target entity is not referenced by any mapping seen in the run
    TargetOnly,
    /// Mapping exists but the mapped target entity is gone
    TargetMissing,
    /// Source entity listed but gone when its detail was fetched
    SourceMissing,
    StatusDiffers,
    CountDiffers,
    CodesDiffer,
    DetailsDiffer,
    /// Fetching or comparing the item failed
    FetchFailed,
}

impl MismatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MappingMissing => "mapping-missing",
            Self::TargetOnly => "target-only",
            Self::TargetMissing => "target-missing",
            Self::SourceMissing => "source-missing",
            Self::StatusDiffers => "status-differs",
            Self::CountDiffers => "count-differs",
            Self::CodesDiffer => "codes-differ",
            Self::DetailsDiffer => "details-differ",
            Self::FetchFailed => "fetch-failed",
        }
    }
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected divergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
    pub reason: MismatchReason,
    pub details: String,
}

impl MismatchRecord {
    pub fn for_source(
        source_id: impl Into<String>,
        target_id: Option<TargetId>,
        reason: MismatchReason,
        details: impl Into<String>,
    ) -> Self {
        Self { source_id: Some(source_id.into()), target_id, reason, details: details.into() }
    }

    pub fn target_only(target_id: TargetId) -> Self {
        Self {
            source_id: None,
            target_id: Some(target_id),
            reason: MismatchReason::TargetOnly,
            details: "target entity not referenced by any mapping".to_string(),
        }
    }
}

/// Summary of one reconciliation run.
///
/// Every source entity lands in exactly one of `paired`, `mapping_missing`,
/// `excluded` or (when the page itself could not be read) nowhere; every
/// target entity not paired lands in `target_only`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub source_total: u64,
    pub target_total: u64,
    pub pages_processed: u64,
    pub pages_failed: u64,
    /// Source entities with a mapping, whatever the comparison result
    pub paired: u64,
    /// Paired entities that compared equal
    pub matched: u64,
    pub mapping_missing: u64,
    /// Unmapped source entities in an allow-listed partition
    pub excluded: u64,
    pub target_only: u64,
    /// Items whose fetch or comparison failed
    pub failed: u64,
    pub mismatch_count: u64,
    pub mismatches: Vec<MismatchRecord>,
    /// Run-level problems (e.g. the source total could not be read)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl MismatchReport {
    pub fn reason_for(&self, source_id: &str) -> Option<MismatchReason> {
        self.mismatches
            .iter()
            .find(|record| record.source_id.as_deref() == Some(source_id))
            .map(|record| record.reason)
    }

    pub fn count_of(&self, reason: MismatchReason) -> usize {
        self.mismatches.iter().filter(|record| record.reason == reason).count()
    }
}

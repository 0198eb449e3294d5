//! Synchronization outcomes

use serde::{Deserialize, Serialize};

use super::mapping::{Mapping, TargetId};
use crate::errors::SyncBridgeError;

/// Why a synchronize call made no change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Echo of a change this engine wrote into the target system
    OriginIsTarget,
    /// A mapping already exists, the create was delivered twice
    AlreadyMapped,
    /// Update or delete arrived before the create, or the entity lives only
    /// in the target system
    MappingNotFound,
    /// The source entity disappeared before it could be read
    SourceNotFound,
    /// Event type this engine does not handle
    UnsupportedEvent,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OriginIsTarget => "origin-is-target",
            Self::AlreadyMapped => "already-mapped",
            Self::MappingNotFound => "mapping-not-found",
            Self::SourceNotFound => "source-not-found",
            Self::UnsupportedEvent => "unsupported-event",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named stage of a synchronize pass, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStage {
    CheckExisting,
    FetchSource,
    Transform,
    Create,
    SaveMapping,
    LookupMapping,
    Update,
    Delete,
    DeleteMapping,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckExisting => "check-existing",
            Self::FetchSource => "fetch-source",
            Self::Transform => "transform",
            Self::Create => "create",
            Self::SaveMapping => "save-mapping",
            Self::LookupMapping => "lookup-mapping",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::DeleteMapping => "delete-mapping",
        }
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed synchronize pass and the stage it failed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub stage: SyncStage,
    pub error: SyncBridgeError,
}

impl SyncFailure {
    pub fn new(stage: SyncStage, error: SyncBridgeError) -> Self {
        Self { stage, error }
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

/// Return contract of the synchronization orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum SyncOutcome {
    Created { target_id: TargetId },
    Updated,
    Deleted,
    Skipped { reason: SkipReason },
    /// Lost the duplicate-mapping race: the existing mapping wins and the
    /// target entity created by this pass is left orphaned.
    DuplicateMapping { orphaned: TargetId, existing: Mapping },
    Failed { failure: SyncFailure },
}

impl SyncOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn failed(stage: SyncStage, error: SyncBridgeError) -> Self {
        Self::Failed { failure: SyncFailure::new(stage, error) }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short label used for telemetry and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Skipped { .. } => "skipped",
            Self::DuplicateMapping { .. } => "duplicate-mapping",
            Self::Failed { .. } => "failed",
        }
    }
}

impl From<SyncFailure> for SyncOutcome {
    fn from(failure: SyncFailure) -> Self {
        Self::Failed { failure }
    }
}

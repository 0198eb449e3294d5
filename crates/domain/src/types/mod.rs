//! Domain types and models

pub mod entity;
pub mod mapping;
pub mod notification;
pub mod outcome;
pub mod reconciliation;
pub mod retry;

pub use entity::{EntitySummary, Page, SourceEntity, SourceEntityRef, TargetEntity, TargetEntityRef};
pub use mapping::{DuplicateMapping, Mapping, MappingType, MappingWriteOutcome, TargetId};
pub use notification::{AdditionalInformation, ChangeEventMessage, ChangeKind, ChangeNotification};
pub use outcome::{SkipReason, SyncFailure, SyncOutcome, SyncStage};
pub use reconciliation::{DatasetPage, MismatchReason, MismatchRecord, MismatchReport};
pub use retry::{DeadLetter, MappingRetryMessage};

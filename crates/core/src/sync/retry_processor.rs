//! Consumer-side handling of queued mapping writes

use std::sync::Arc;

use syncbridge_domain::constants::{EVENT_MAPPING_DEAD_LETTERED, MAX_REASON_LENGTH};
use syncbridge_domain::{DeadLetter, MappingRetryMessage, MappingWriteOutcome};
use tracing::{error, info, instrument, warn};

use super::orchestrator::SyncOrchestrator;
use super::ports::DeadLetterStore;
use crate::telemetry_ports::{TelemetryEvent, TelemetrySink};

/// What the transport should do with a message after one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Mapping written (or found already written)
    Completed,
    /// Lost the duplicate-mapping race; nothing left to retry
    Duplicate,
    /// Redeliver this message after the configured delay
    Requeue(MappingRetryMessage),
    /// Given up; the message is in the dead-letter store
    DeadLettered,
}

/// Decides the fate of each redelivered mapping write.
pub struct MappingRetryProcessor {
    orchestrator: Arc<SyncOrchestrator>,
    dead_letters: Arc<dyn DeadLetterStore>,
    telemetry: Arc<dyn TelemetrySink>,
    max_attempts: u32,
}

impl MappingRetryProcessor {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        dead_letters: Arc<dyn DeadLetterStore>,
        telemetry: Arc<dyn TelemetrySink>,
        max_attempts: u32,
    ) -> Self {
        Self { orchestrator, dead_letters, telemetry, max_attempts }
    }

    #[instrument(skip(self, message), fields(message_id = %message.id, source_id = %message.mapping.source_id, attempt = message.attempt))]
    pub async fn process(&self, message: MappingRetryMessage) -> RetryDisposition {
        match self.orchestrator.retry_mapping(&message).await {
            MappingWriteOutcome::Created => {
                info!("queued mapping write succeeded");
                RetryDisposition::Completed
            }
            MappingWriteOutcome::Conflict(_) => RetryDisposition::Duplicate,
            MappingWriteOutcome::TransientError(e) if message.attempt < self.max_attempts => {
                warn!(error = %e, "mapping write failed again, requeueing");
                let reason = syncbridge_common::truncate_reason(&e.to_string(), MAX_REASON_LENGTH);
                RetryDisposition::Requeue(message.next_attempt(reason))
            }
            MappingWriteOutcome::TransientError(e) => {
                let reason = format!("retry attempts exhausted: {e}");
                self.dead_letter(message, reason).await
            }
            MappingWriteOutcome::PermanentError(e) => {
                let reason = format!("permanent failure: {e}");
                self.dead_letter(message, reason).await
            }
        }
    }

    /// Give up on a message: log it, emit a fatal event and store the dead letter.
    pub async fn dead_letter(
        &self,
        message: MappingRetryMessage,
        reason: String,
    ) -> RetryDisposition {
        let reason = syncbridge_common::truncate_reason(&reason, MAX_REASON_LENGTH);
        error!(
            source_id = %message.mapping.source_id,
            target_id = %message.mapping.target_id,
            attempt = message.attempt,
            reason = %reason,
            "mapping write dead-lettered: target entity has no mapping and needs manual repair"
        );
        self.telemetry.emit(
            TelemetryEvent::new(EVENT_MAPPING_DEAD_LETTERED)
                .with("sourceId", &message.mapping.source_id)
                .with("targetId", &message.mapping.target_id)
                .with("attempt", message.attempt)
                .with("reason", &reason)
                .fatal(),
        );

        if let Err(e) = self.dead_letters.store(DeadLetter::new(message, reason)).await {
            error!(error = %e, "failed to persist dead letter");
        }
        RetryDisposition::DeadLettered
    }
}

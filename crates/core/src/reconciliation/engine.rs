//! Paginated dataset reconciliation
//!
//! A run reads the source total once, walks the source dataset page by page
//! (items of a page concurrently), then walks the target id listing to find
//! entities no mapping points at. Every per-item failure is captured as its
//! own mismatch; the run itself always produces a report.
//!
//! Target-only detection needs every mapping of the run. When the source
//! total, a source page or a mapping lookup could not be read, the target
//! listing is only counted and a single run-level error replaces the
//! per-id `target-only` records.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use syncbridge_domain::constants::{EVENT_RECONCILIATION_MISMATCH, EVENT_RECONCILIATION_REPORT};
use syncbridge_domain::{
    DatasetPage, MismatchReason, MismatchRecord, MismatchReport, ReconciliationConfig,
    SourceEntityRef, SyncBridgeError, TargetId,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::classifier::MismatchClassifier;
use crate::sync::ports::{EntityMapper, MappingStore, SourceSystemClient, TargetSystemClient};
use crate::sync::RetryableCaller;
use crate::telemetry_ports::{TelemetryEvent, TelemetrySink};

/// Collaborators needed by the reconciliation engine.
#[derive(Clone)]
pub struct ReconciliationDependencies {
    pub mappings: Arc<dyn MappingStore>,
    pub source: Arc<dyn SourceSystemClient>,
    pub target: Arc<dyn TargetSystemClient>,
    pub mapper: Arc<dyn EntityMapper>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// Run settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationSettings {
    pub page_size: u64,
    pub excluded_partitions: BTreeSet<String>,
}

impl From<&ReconciliationConfig> for ReconciliationSettings {
    fn from(config: &ReconciliationConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            excluded_partitions: config.excluded_partitions.clone(),
        }
    }
}

/// Result of checking one source entity.
#[derive(Debug)]
enum ItemOutcome {
    Matched { target_id: TargetId },
    Mismatched(MismatchRecord),
    MappingMissing(MismatchRecord),
    Excluded,
    /// Mapping lookup failed, so the item is in no other bucket
    LookupFailed(MismatchRecord),
}

/// State of one run, folded page by page and returned by value.
#[derive(Debug)]
struct RunAccumulator {
    report: MismatchReport,
    mapped_targets: HashSet<String>,
    /// Cleared when any mapping of the source dataset went unseen.
    source_pass_complete: bool,
}

impl RunAccumulator {
    fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            report: MismatchReport {
                run_id,
                started_at: now,
                completed_at: now,
                source_total: 0,
                target_total: 0,
                pages_processed: 0,
                pages_failed: 0,
                paired: 0,
                matched: 0,
                mapping_missing: 0,
                excluded: 0,
                target_only: 0,
                failed: 0,
                mismatch_count: 0,
                mismatches: Vec::new(),
                errors: Vec::new(),
            },
            mapped_targets: HashSet::new(),
            source_pass_complete: true,
        }
    }

    fn absorb(mut self, outcome: ItemOutcome) -> Self {
        let report = &mut self.report;
        match outcome {
            ItemOutcome::Matched { target_id } => {
                report.paired = report.paired.saturating_add(1);
                report.matched = report.matched.saturating_add(1);
                self.mapped_targets.insert(target_id.as_key());
            }
            ItemOutcome::Mismatched(record) => {
                report.paired = report.paired.saturating_add(1);
                if record.reason == MismatchReason::FetchFailed {
                    report.failed = report.failed.saturating_add(1);
                }
                if let Some(target_id) = &record.target_id {
                    self.mapped_targets.insert(target_id.as_key());
                }
                self.push(record);
            }
            ItemOutcome::MappingMissing(record) => {
                report.mapping_missing = report.mapping_missing.saturating_add(1);
                self.push(record);
            }
            ItemOutcome::Excluded => {
                report.excluded = report.excluded.saturating_add(1);
            }
            ItemOutcome::LookupFailed(record) => {
                report.failed = report.failed.saturating_add(1);
                self.source_pass_complete = false;
                self.push(record);
            }
        }
        self
    }

    fn target_only(mut self, target_id: TargetId) -> Self {
        self.report.target_only = self.report.target_only.saturating_add(1);
        self.push(MismatchRecord::target_only(target_id));
        self
    }

    /// Every listed target id that no mapping pointed at is target-only.
    fn absorb_target_ids(self, ids: impl Iterator<Item = TargetId>) -> Self {
        ids.fold(self, |acc, id| {
            if acc.mapped_targets.contains(&id.as_key()) {
                acc
            } else {
                acc.target_only(id)
            }
        })
        .page_done()
    }

    fn page_done(mut self) -> Self {
        self.report.pages_processed = self.report.pages_processed.saturating_add(1);
        self
    }

    fn page_failed(mut self, description: String) -> Self {
        self.report.pages_failed = self.report.pages_failed.saturating_add(1);
        self.report.errors.push(description);
        self
    }

    fn source_incomplete(mut self, description: String) -> Self {
        self.source_pass_complete = false;
        self.report.errors.push(description);
        self
    }

    fn push(&mut self, record: MismatchRecord) {
        self.report.mismatch_count = self.report.mismatch_count.saturating_add(1);
        self.report.mismatches.push(record);
    }

    fn finish(mut self) -> MismatchReport {
        self.report.completed_at = Utc::now();
        self.report
    }
}

/// Compares the source and target datasets and reports drift.
///
/// Holds no per-run state; concurrent runs do not interfere.
pub struct ReconciliationEngine {
    deps: ReconciliationDependencies,
    caller: RetryableCaller,
    classifier: MismatchClassifier,
    settings: ReconciliationSettings,
}

impl ReconciliationEngine {
    pub fn new(
        deps: ReconciliationDependencies,
        caller: RetryableCaller,
        classifier: MismatchClassifier,
        settings: ReconciliationSettings,
    ) -> Self {
        Self { deps, caller, classifier, settings }
    }

    /// Run a full reconciliation. Never fails as a whole.
    #[instrument(skip(self), fields(page_size = self.settings.page_size))]
    pub async fn run(&self) -> MismatchReport {
        let run_id = Uuid::now_v7();
        info!(run_id = %run_id, "reconciliation run started");

        let acc = RunAccumulator::new(run_id);
        let acc = self.reconcile_source(acc).await;
        let acc = self.reconcile_target(acc).await;
        let report = acc.finish();

        self.publish(&report);
        report
    }

    async fn reconcile_source(&self, mut acc: RunAccumulator) -> RunAccumulator {
        let total = self.caller.call("count-source", || self.deps.source.count_entities()).await;
        let total = match total {
            Ok(total) => total,
            Err(e) => {
                warn!(error = %e, "could not read source total, skipping source pass");
                return acc.source_incomplete(format!("source total unavailable: {e}"));
            }
        };
        acc.report.source_total = total;

        let page_size = self.settings.page_size;
        for page in DatasetPage::partition(total, page_size) {
            let listing = self
                .caller
                .call("list-source", || self.deps.source.list_entities(page.index, page_size))
                .await;
            let entities = match listing {
                Ok(listing) => listing.content,
                Err(e) => {
                    warn!(page = page.index, error = %e, "source page fetch failed");
                    acc = acc.page_failed(format!("source page {} failed: {e}", page.index));
                    acc.source_pass_complete = false;
                    continue;
                }
            };

            debug!(page = page.index, items = entities.len(), "checking source page");
            let outcomes = join_all(entities.iter().map(|entity| self.check_item(entity))).await;
            acc = outcomes.into_iter().fold(acc, RunAccumulator::absorb).page_done();
        }
        acc
    }

    async fn reconcile_target(&self, mut acc: RunAccumulator) -> RunAccumulator {
        let page_size = self.settings.page_size;
        let first_page =
            self.caller.call("list-target", || self.deps.target.list_ids(0, page_size)).await;
        let first = match first_page {
            Ok(first) => first,
            Err(e) => {
                warn!(error = %e, "could not read target listing, skipping target pass");
                return acc.page_failed(format!("target page 0 failed: {e}"));
            }
        };
        acc.report.target_total = first.total_elements;

        if !acc.source_pass_complete {
            warn!(
                target_total = first.total_elements,
                "source pass incomplete, skipping target-only detection"
            );
            return acc.page_done().source_incomplete(
                "target-only detection skipped: source pass incomplete".to_string(),
            );
        }

        let mut pages = DatasetPage::partition(first.total_elements, page_size).into_iter();
        // Page 0 is already in hand.
        pages.next();
        acc = acc.absorb_target_ids(first.content.into_iter().map(|r| r.id));

        for page in pages {
            let listing = self
                .caller
                .call("list-target", || self.deps.target.list_ids(page.index, page_size))
                .await;
            match listing {
                Ok(listing) => {
                    acc = acc.absorb_target_ids(listing.content.into_iter().map(|r| r.id));
                }
                Err(e) => {
                    warn!(page = page.index, error = %e, "target page fetch failed");
                    acc = acc.page_failed(format!("target page {} failed: {e}", page.index));
                }
            }
        }
        acc
    }

    async fn check_item(&self, entity: &SourceEntityRef) -> ItemOutcome {
        let mapping = match self
            .caller
            .call("lookup-mapping", || self.deps.mappings.find_by_source_id(&entity.id))
            .await
        {
            Ok(mapping) => mapping,
            Err(e) => {
                return ItemOutcome::LookupFailed(MismatchRecord::for_source(
                    &entity.id,
                    None,
                    MismatchReason::FetchFailed,
                    format!("mapping lookup failed: {e}"),
                ));
            }
        };

        let Some(mapping) = mapping else {
            let excluded = entity
                .partition
                .as_ref()
                .is_some_and(|partition| self.settings.excluded_partitions.contains(partition));
            if excluded {
                return ItemOutcome::Excluded;
            }
            return ItemOutcome::MappingMissing(MismatchRecord::for_source(
                &entity.id,
                None,
                MismatchReason::MappingMissing,
                "source entity has no mapping",
            ));
        };

        let target_id = mapping.target_id;
        let (source, target) = tokio::join!(
            self.caller.call("fetch-source", || self.deps.source.get_entity(&entity.id)),
            self.caller.call("fetch-target", || self.deps.target.get_entity(&target_id)),
        );

        let mismatch = |reason: MismatchReason, details: String| {
            ItemOutcome::Mismatched(MismatchRecord::for_source(
                &entity.id,
                Some(target_id.clone()),
                reason,
                details,
            ))
        };

        match (source, target) {
            (Ok(source), Ok(target)) => {
                let source_summary = self.deps.mapper.summarize_source(&source);
                let target_summary = self.deps.mapper.summarize_target(&target);
                match self.classifier.classify(&source_summary, &target_summary) {
                    None => ItemOutcome::Matched { target_id: target_id.clone() },
                    Some(divergence) => mismatch(divergence.reason, divergence.details),
                }
            }
            (_, Err(e)) if e.is_not_found() => {
                mismatch(MismatchReason::TargetMissing, "mapped target entity not found".into())
            }
            (Err(e), _) if e.is_not_found() => {
                mismatch(MismatchReason::SourceMissing, "source entity disappeared".into())
            }
            (Err(e), _) | (_, Err(e)) => mismatch(MismatchReason::FetchFailed, describe(&e)),
        }
    }

    fn publish(&self, report: &MismatchReport) {
        for record in &report.mismatches {
            self.deps.telemetry.emit(
                TelemetryEvent::new(EVENT_RECONCILIATION_MISMATCH)
                    .with("runId", report.run_id)
                    .with("reason", record.reason)
                    .with_opt("sourceId", record.source_id.as_ref())
                    .with_opt("targetId", record.target_id.as_ref())
                    .with("details", &record.details),
            );
        }

        info!(
            run_id = %report.run_id,
            source_total = report.source_total,
            target_total = report.target_total,
            pages_processed = report.pages_processed,
            pages_failed = report.pages_failed,
            matched = report.matched,
            mismatch_count = report.mismatch_count,
            "reconciliation run completed"
        );
        self.deps.telemetry.emit(
            TelemetryEvent::new(EVENT_RECONCILIATION_REPORT)
                .with("runId", report.run_id)
                .with("sourceTotal", report.source_total)
                .with("targetTotal", report.target_total)
                .with("pagesProcessed", report.pages_processed)
                .with("pagesFailed", report.pages_failed)
                .with("paired", report.paired)
                .with("matched", report.matched)
                .with("mappingMissing", report.mapping_missing)
                .with("excluded", report.excluded)
                .with("targetOnly", report.target_only)
                .with("failed", report.failed)
                .with("mismatchCount", report.mismatch_count),
        );
    }
}

fn describe(error: &SyncBridgeError) -> String {
    format!("{} ({})", error, error.category())
}

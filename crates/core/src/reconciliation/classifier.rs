//! Ordered comparison of a mapped (source, target) pair

use syncbridge_domain::{EntitySummary, MismatchReason, NormalizationConfig};

use super::normalizer::Normalizer;

/// First divergence found between two summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub reason: MismatchReason,
    pub details: String,
}

/// Compares summaries field by field in a fixed order; the first difference
/// decides the reason. Order: status, code count, code set, details.
#[derive(Debug, Clone, Default)]
pub struct MismatchClassifier {
    normalizer: Normalizer,
}

impl MismatchClassifier {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn from_config(config: &NormalizationConfig) -> Self {
        Self::new(Normalizer::new(config))
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// `None` means the pair matches.
    pub fn classify(&self, source: &EntitySummary, target: &EntitySummary) -> Option<Divergence> {
        let n = &self.normalizer;

        let (source_status, target_status) =
            (n.status(source.status.as_deref()), n.status(target.status.as_deref()));
        if source_status != target_status {
            return Some(Divergence {
                reason: MismatchReason::StatusDiffers,
                details: format!("status: source={source_status:?} target={target_status:?}"),
            });
        }

        let (source_count, target_count) = (n.code_count(source), n.code_count(target));
        if source_count != target_count {
            return Some(Divergence {
                reason: MismatchReason::CountDiffers,
                details: format!("code count: source={source_count} target={target_count}"),
            });
        }

        // A side that reports only a count has no set to compare.
        if !is_count_only(source) && !is_count_only(target) {
            let source_codes = n.codes(source.codes.as_deref());
            let target_codes = n.codes(target.codes.as_deref());
            if source_codes != target_codes {
                let only_source: Vec<_> = source_codes.difference(&target_codes).collect();
                let only_target: Vec<_> = target_codes.difference(&source_codes).collect();
                return Some(Divergence {
                    reason: MismatchReason::CodesDiffer,
                    details: format!("codes: source-only={only_source:?} target-only={only_target:?}"),
                });
            }
        }

        let source_details = n.details(&source.details);
        let target_details = n.details(&target.details);
        if source_details != target_details {
            let differing: Vec<&String> = source_details
                .keys()
                .chain(target_details.keys())
                .filter(|key| source_details.get(*key) != target_details.get(*key))
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            return Some(Divergence {
                reason: MismatchReason::DetailsDiffer,
                details: format!("details differ: {differing:?}"),
            });
        }

        None
    }
}

fn is_count_only(summary: &EntitySummary) -> bool {
    summary.codes.is_none() && summary.code_count.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> MismatchClassifier {
        let mut config = NormalizationConfig::default();
        config.deprecated_codes.insert("OLD".into(), "NEW".into());
        MismatchClassifier::from_config(&config)
    }

    #[test]
    fn equivalent_encodings_match() {
        let source = EntitySummary::default()
            .with_status("active")
            .with_codes(["old", "new"])
            .with_detail("comment", "x ");
        let target = EntitySummary::default()
            .with_status(" ACTIVE")
            .with_codes(["NEW"])
            .with_detail("comment", "x")
            .with_detail("expiry", "");

        assert_eq!(classifier().classify(&source, &target), None);
    }

    #[test]
    fn absent_collection_matches_zero_count() {
        let source = EntitySummary::default();
        let target = EntitySummary::default().with_code_count(0);
        assert_eq!(classifier().classify(&source, &target), None);
    }

    /// Validates that the first divergence in the fixed order wins.
    ///
    /// Assertions:
    /// - Status beats every later difference.
    /// - Count beats codes and details.
    /// - Codes beat details.
    #[test]
    fn first_divergence_wins() {
        let classifier = classifier();
        let source = EntitySummary::default()
            .with_status("ACTIVE")
            .with_codes(["A", "B"])
            .with_detail("comment", "one");

        let all_differ = EntitySummary::default()
            .with_status("INACTIVE")
            .with_codes(["A"])
            .with_detail("comment", "two");
        assert_eq!(
            classifier.classify(&source, &all_differ).map(|d| d.reason),
            Some(MismatchReason::StatusDiffers)
        );

        let count_and_details = EntitySummary { status: Some("ACTIVE".into()), ..all_differ.clone() };
        assert_eq!(
            classifier.classify(&source, &count_and_details).map(|d| d.reason),
            Some(MismatchReason::CountDiffers)
        );

        let codes_and_details = count_and_details.clone().with_codes(["A", "C"]);
        assert_eq!(
            classifier.classify(&source, &codes_and_details).map(|d| d.reason),
            Some(MismatchReason::CodesDiffer)
        );

        let details_only = codes_and_details.with_codes(["B", "A"]);
        assert_eq!(
            classifier.classify(&source, &details_only).map(|d| d.reason),
            Some(MismatchReason::DetailsDiffer)
        );
    }

    #[test]
    fn count_only_side_skips_set_comparison() {
        let source = EntitySummary::default().with_codes(["A", "B"]);
        let target = EntitySummary::default().with_code_count(2);
        assert_eq!(classifier().classify(&source, &target), None);
    }
}

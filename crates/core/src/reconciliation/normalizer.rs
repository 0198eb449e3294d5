//! Normalization applied to both sides before comparison
//!
//! The two systems encode equivalent facts differently. Every rule lives
//! here so that source and target summaries go through the same code.

use std::collections::{BTreeMap, BTreeSet};

use syncbridge_domain::{EntitySummary, NormalizationConfig};
use tracing::warn;

/// Deterministic normalization of [`EntitySummary`] fields.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Keys and values already normalized; every value is final
    deprecated: BTreeMap<String, String>,
    excluded: BTreeSet<String>,
}

impl Normalizer {
    pub fn new(config: &NormalizationConfig) -> Self {
        let direct: BTreeMap<String, String> = config
            .deprecated_codes
            .iter()
            .map(|(from, to)| (normalize_token(from), normalize_token(to)))
            .collect();
        let deprecated = resolve_chains(&direct);
        let excluded = config.excluded_codes.iter().map(|code| normalize_token(code)).collect();
        Self { deprecated, excluded }
    }

    /// Trimmed, upper-cased status; absent is the empty string.
    pub fn status(&self, status: Option<&str>) -> String {
        status.map(normalize_token).unwrap_or_default()
    }

    /// Normalized code set: absent is empty; codes are trimmed and
    /// upper-cased, deprecated codes collapse to their replacement, excluded
    /// and blank codes are dropped, duplicates collapse.
    pub fn codes(&self, codes: Option<&[String]>) -> BTreeSet<String> {
        codes
            .unwrap_or_default()
            .iter()
            .map(|code| normalize_token(code))
            .map(|code| self.deprecated.get(&code).cloned().unwrap_or(code))
            .filter(|code| !code.is_empty() && !self.excluded.contains(code))
            .collect()
    }

    /// Code count after normalization. A side that reports only a count is
    /// taken at its word.
    pub fn code_count(&self, summary: &EntitySummary) -> usize {
        match (&summary.codes, summary.code_count) {
            (Some(codes), _) => self.codes(Some(codes)).len(),
            (None, Some(count)) => count as usize,
            (None, None) => 0,
        }
    }

    /// Detail values trimmed, empty values dropped.
    pub fn details(&self, details: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        details
            .iter()
            .map(|(key, value)| (key.clone(), value.trim().to_string()))
            .filter(|(_, value)| !value.is_empty())
            .collect()
    }
}

fn normalize_token(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Follow every replacement chain to its end, so A -> B -> C maps A to C.
/// Codes on a cycle all map to the smallest code of that cycle.
fn resolve_chains(direct: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    direct
        .keys()
        .map(|code| {
            let mut path = vec![code.as_str()];
            let mut current = code.as_str();
            let resolved = loop {
                let Some(next) = direct.get(current).map(String::as_str) else {
                    break current;
                };
                if let Some(start) = path.iter().position(|seen| *seen == next) {
                    warn!(code = %code, "deprecated code mapping contains a cycle");
                    break path[start..].iter().copied().min().unwrap_or(next);
                }
                path.push(next);
                current = next;
            };
            (code.clone(), resolved.to_string())
        })
        .collect()
}

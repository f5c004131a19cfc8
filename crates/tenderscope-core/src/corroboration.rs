//! # Corroboration
//!
//! Merging of findings gathered from independent sources.
//!
//! - Exact duplicates from the same source collapse into one finding
//! - Two findings corroborate each other when they carry the same normalized
//!   `finding_type` and come from two distinct sources
//! - The relation is symmetric and never relates a finding to itself
//!   (a finding always shares its own source)
//!
//! The merged list is sorted by `(source, type, description)` so the outcome
//! does not depend on the order in which sources answered.

use crate::Source;
use crate::finding::Finding;
use std::collections::{BTreeMap, BTreeSet};

/// Whether `a` and `b` report the same fact from different sources.
#[must_use]
pub fn corroborates(a: &Finding, b: &Finding) -> bool {
    a.source != b.source && a.type_key() == b.type_key()
}

/// Deduplicate, order and corroborate a merged list of findings.
///
/// Any `corroborated` flag set by a producer is recomputed here: only the
/// merge step sees every source.
#[must_use]
pub fn merge_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut merged = dedup(findings);

    let mut sources_by_type: BTreeMap<String, BTreeSet<Source>> = BTreeMap::new();
    for finding in &merged {
        sources_by_type
            .entry(finding.type_key())
            .or_default()
            .insert(finding.source);
    }

    for finding in &mut merged {
        finding.corroborated = sources_by_type
            .get(&finding.type_key())
            .is_some_and(|sources| sources.len() > 1);
    }

    merged
}

/// Collapse findings with equal source, type and description.
///
/// The survivor keeps the highest severity, the union of evidence
/// (first-seen order) and the highest reported confidence.
fn dedup(findings: Vec<Finding>) -> Vec<Finding> {
    let mut by_identity: BTreeMap<(Source, String, String), Finding> = BTreeMap::new();

    for finding in findings {
        let identity = (
            finding.source,
            finding.type_key(),
            finding.description.trim().to_string(),
        );
        match by_identity.get_mut(&identity) {
            Some(existing) => {
                existing.severity = existing.severity.max(finding.severity);
                for item in finding.evidence {
                    if !existing.evidence.contains(&item) {
                        existing.evidence.push(item);
                    }
                }
                existing.confidence = match (existing.confidence, finding.confidence) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
            }
            None => {
                by_identity.insert(identity, finding);
            }
        }
    }

    by_identity.into_values().collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;

    fn finding(source: Source, finding_type: &str) -> Finding {
        Finding::new(source, finding_type, format!("{finding_type} seen by {source}"), Severity::High)
    }

    #[test]
    fn same_type_from_two_sources_is_corroborated() {
        let merged = merge_findings(vec![
            finding(Source::History, "single_bidder"),
            finding(Source::Registry, "single_bidder"),
        ]);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|f| f.corroborated));
    }

    #[test]
    fn same_type_from_one_source_is_not_corroborated() {
        let mut a = finding(Source::Web, "adverse_media");
        a.description = "first article".to_string();
        let mut b = finding(Source::Web, "adverse_media");
        b.description = "second article".to_string();

        let merged = merge_findings(vec![a, b]);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|f| !f.corroborated));
    }

    #[test]
    fn producer_flag_is_recomputed() {
        let mut lone = finding(Source::Ownership, "shared_ownership");
        lone.corroborated = true;
        let merged = merge_findings(vec![lone]);
        assert!(!merged[0].corroborated);
    }

    #[test]
    fn corroboration_uses_normalized_types() {
        let merged = merge_findings(vec![
            finding(Source::History, "Price Anomaly"),
            finding(Source::Documents, "price-anomaly"),
        ]);
        assert!(merged.iter().all(|f| f.corroborated));
    }

    #[test]
    fn corroborates_is_symmetric_and_irreflexive() {
        let a = finding(Source::History, "single_bidder");
        let b = finding(Source::Registry, "single_bidder");
        assert!(corroborates(&a, &b));
        assert!(corroborates(&b, &a));
        assert!(!corroborates(&a, &a));
    }

    #[test]
    fn exact_duplicates_collapse_and_merge_evidence() {
        let a = finding(Source::Web, "adverse_media")
            .with_evidence("https://news.example/1")
            .with_confidence(0.4);
        let b = finding(Source::Web, "adverse_media")
            .with_evidence("https://news.example/1")
            .with_evidence("https://news.example/2")
            .with_confidence(0.9);

        let merged = merge_findings(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].evidence.len(), 2);
        assert_eq!(merged[0].confidence, Some(0.9));
    }

    #[test]
    fn merge_is_order_independent() {
        let input = vec![
            finding(Source::Web, "adverse_media"),
            finding(Source::History, "single_bidder"),
            finding(Source::Registry, "single_bidder"),
        ];
        let mut reversed = input.clone();
        reversed.reverse();
        assert_eq!(merge_findings(input), merge_findings(reversed));
    }
}

//! # Property-Based Tests
//!
//! Invariants of the scorer, corroboration and case workflow, checked with
//! proptest.

use chrono::Utc;
use proptest::collection::vec;
use proptest::prelude::*;
use tenderscope_core::case::CaseChange;
use tenderscope_core::{
    Case, CaseMutation, EntityLink, Finding, IdSequence, LevelThresholds, NewCase, RiskLevel,
    RiskScorer, Severity, Source, SourceCoverage, TenderLink, corroborates, merge_findings,
};

fn source() -> impl Strategy<Value = Source> {
    prop::sample::select(Source::ALL.to_vec())
}

fn severity() -> impl Strategy<Value = Severity> {
    prop::sample::select(Severity::ALL.to_vec())
}

fn finding() -> impl Strategy<Value = Finding> {
    (
        source(),
        prop::sample::select(vec!["single_bidder", "price_anomaly", "adverse_media", "Shared Ownership"]),
        "[a-z ]{0,12}",
        severity(),
    )
        .prop_map(|(source, finding_type, description, severity)| {
            Finding::new(source, finding_type, description, severity)
        })
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Every score maps to exactly one level, and levels never go down as
    /// the score goes up.
    #[test]
    fn level_is_total_and_monotonic(a in 0u8..=100, b in 0u8..=100) {
        let thresholds = LevelThresholds::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(thresholds.classify(low) <= thresholds.classify(high));
        prop_assert!(RiskLevel::ALL.contains(&thresholds.classify(a)));
    }

    /// The scorer never leaves `[0, 100]` and is deterministic.
    #[test]
    fn score_is_bounded_and_deterministic(findings in vec(finding(), 0..40)) {
        let merged = merge_findings(findings);
        let scorer = RiskScorer::default();
        let coverage = SourceCoverage::complete(Source::ALL.len());
        let a = scorer.score(&merged, &coverage);
        let b = scorer.score(&merged, &coverage);
        prop_assert!(a.risk_score <= 100);
        prop_assert!((0.0..=1.0).contains(&a.confidence));
        prop_assert_eq!(a, b);
    }

    /// Adding a finding never lowers the risk level.
    #[test]
    fn more_findings_never_lower_the_level(findings in vec(finding(), 0..20), extra in finding()) {
        let scorer = RiskScorer::default();
        let coverage = SourceCoverage::complete(Source::ALL.len());
        let before = scorer.score(&merge_findings(findings.clone()), &coverage);
        let mut more = findings;
        more.push(extra);
        let after = scorer.score(&merge_findings(more), &coverage);
        prop_assert!(before.risk_level <= after.risk_level);
    }

    /// Corroboration is symmetric and irreflexive.
    #[test]
    fn corroboration_is_symmetric(a in finding(), b in finding()) {
        prop_assert_eq!(corroborates(&a, &b), corroborates(&b, &a));
        prop_assert!(!corroborates(&a, &a));
    }

    /// After merging, a finding is corroborated exactly when another
    /// finding in the list corroborates it.
    #[test]
    fn merged_flags_match_the_relation(findings in vec(finding(), 0..30)) {
        let merged = merge_findings(findings);
        for f in &merged {
            let expected = merged.iter().any(|other| corroborates(f, other));
            prop_assert_eq!(f.corroborated, expected);
        }
    }

    /// Attaching the same tender or entity any number of times yields one
    /// membership row and one timeline entry.
    #[test]
    fn attach_is_idempotent(repeats in 1usize..6, tender in "UA-[0-9]{4}-[0-9]{6}", entity in "[0-9]{8}") {
        let mut ids = IdSequence::new();
        let (mut case, _) = Case::create(NewCase::titled("Property case"), None, &mut ids, Utc::now())
            .expect("create");

        let mut entries = 0;
        for _ in 0..repeats {
            let tender_change = case
                .apply(
                    CaseMutation::AttachTender(TenderLink { tender_id: tender.clone(), role: None }),
                    None,
                    &mut ids,
                    Utc::now(),
                )
                .expect("attach tender");
            let entity_change = case
                .apply(
                    CaseMutation::AttachEntity(EntityLink {
                        entity_id: entity.clone(),
                        entity_type: "company".to_string(),
                        entity_name: "Acme".to_string(),
                        role: None,
                    }),
                    None,
                    &mut ids,
                    Utc::now(),
                )
                .expect("attach entity");
            for change in [tender_change, entity_change] {
                if matches!(change, CaseChange::Applied(_)) {
                    entries += 1;
                }
            }
        }

        prop_assert_eq!(case.tenders.len(), 1);
        prop_assert_eq!(case.entities.len(), 1);
        prop_assert_eq!(entries, 2);
    }
}

//! # Risk Scoring
//!
//! Pure aggregation of merged findings into a risk score, a risk level, a
//! confidence figure, recommendations and a summary.
//!
//! ## Formula
//!
//! ```text
//! raw        = Σ weight(severity) × (multiplier if corroborated else 1)
//! risk_score = floor(min(raw, 100))
//! level      = first threshold band containing risk_score
//! confidence = mean(finding confidence, default 0.5) × answered / registered
//! ```
//!
//! With no findings the mean is replaced by `empty_confidence`. The level
//! is a total, monotonic function of the score for any valid configuration.
//!
//! Recommendations and the summary are templated from the set of finding
//! types present, never generated free-form, so the whole function is
//! deterministic.

use crate::finding::Finding;
use crate::primitives::{
    DEFAULT_CORROBORATION_MULTIPLIER, DEFAULT_FINDING_CONFIDENCE, DEFAULT_LEVEL_THRESHOLDS,
    DEFAULT_SEVERITY_WEIGHTS, EMPTY_INVESTIGATION_CONFIDENCE, MAX_RISK_SCORE,
};
use crate::{EngineError, RiskLevel, Severity, Source};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Weight contributed by one finding of each severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        let [low, medium, high, critical] = DEFAULT_SEVERITY_WEIGHTS;
        Self {
            low,
            medium,
            high,
            critical,
        }
    }
}

impl SeverityWeights {
    #[must_use]
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }
}

/// Lower bounds (inclusive) of each level above `minimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
    pub critical: u8,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        let [low, medium, high, critical] = DEFAULT_LEVEL_THRESHOLDS;
        Self {
            low,
            medium,
            high,
            critical,
        }
    }
}

impl LevelThresholds {
    /// Map a score to its level. Total over `u8`; scores above 100 are
    /// treated as 100.
    #[must_use]
    pub fn classify(&self, score: u8) -> RiskLevel {
        let score = score.min(MAX_RISK_SCORE);
        if score >= self.critical {
            RiskLevel::Critical
        } else if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else if score >= self.low {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }
}

/// Every tunable of the scorer, passed explicitly to [`RiskScorer::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: SeverityWeights,
    pub corroboration_multiplier: f64,
    pub thresholds: LevelThresholds,
    /// Confidence assumed for findings that do not report one.
    pub default_finding_confidence: f64,
    /// Confidence of an investigation whose answering sources found nothing.
    pub empty_confidence: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: SeverityWeights::default(),
            corroboration_multiplier: DEFAULT_CORROBORATION_MULTIPLIER,
            thresholds: LevelThresholds::default(),
            default_finding_confidence: DEFAULT_FINDING_CONFIDENCE,
            empty_confidence: EMPTY_INVESTIGATION_CONFIDENCE,
        }
    }
}

impl ScoringConfig {
    /// Reject configurations that would break monotonicity or totality.
    ///
    /// - weights finite, non-negative and non-decreasing with severity
    /// - multiplier finite and `>= 1`
    /// - thresholds strictly increasing, first one `> 0`, last one `<= 100`
    /// - confidences within `[0, 1]`
    pub fn validate(&self) -> Result<(), EngineError> {
        let w = &self.weights;
        let weights = [w.low, w.medium, w.high, w.critical];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(EngineError::InvalidInput(
                "severity weights must be finite and non-negative".to_string(),
            ));
        }
        if weights.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(EngineError::InvalidInput(
                "severity weights must not decrease with severity".to_string(),
            ));
        }
        if !self.corroboration_multiplier.is_finite() || self.corroboration_multiplier < 1.0 {
            return Err(EngineError::InvalidInput(
                "corroboration multiplier must be a finite value >= 1".to_string(),
            ));
        }
        let t = &self.thresholds;
        let bounds = [t.low, t.medium, t.high, t.critical];
        if t.low == 0 || bounds.windows(2).any(|pair| pair[0] >= pair[1]) || t.critical > MAX_RISK_SCORE {
            return Err(EngineError::InvalidInput(format!(
                "level thresholds must strictly increase within 1..={MAX_RISK_SCORE}"
            )));
        }
        for (name, value) in [
            ("default_finding_confidence", self.default_finding_confidence),
            ("empty_confidence", self.empty_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidInput(format!("{name} must be within [0, 1]")));
            }
        }
        Ok(())
    }
}

// =============================================================================
// SCORER
// =============================================================================

/// How many sources were asked and which ones did not answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceCoverage {
    /// Number of registered sources (including synthesis, if configured).
    pub registered: usize,
    /// Registered sources that failed or missed the deadline.
    pub missing: Vec<Source>,
}

impl SourceCoverage {
    /// Coverage in which every registered source answered.
    #[must_use]
    pub fn complete(registered: usize) -> Self {
        Self {
            registered,
            missing: Vec::new(),
        }
    }

    #[must_use]
    pub fn answered(&self) -> usize {
        self.registered.saturating_sub(self.missing.len())
    }

    /// Fraction of registered sources that answered; `0` when none are registered.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.registered == 0 {
            0.0
        } else {
            self.answered() as f64 / self.registered as f64
        }
    }
}

/// Output of [`RiskScorer::score`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    /// Weighted sum after capping, before truncation.
    pub raw_score: f64,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub summary: String,
}

/// Pure scorer over merged findings.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    config: ScoringConfig,
}

impl RiskScorer {
    /// Create a scorer after validating its configuration.
    pub fn new(config: ScoringConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Capped weighted sum of the findings.
    #[must_use]
    pub fn raw_score(&self, findings: &[Finding]) -> f64 {
        let sum: f64 = findings
            .iter()
            .map(|f| {
                let weight = self.config.weights.weight(f.severity);
                if f.corroborated {
                    weight * self.config.corroboration_multiplier
                } else {
                    weight
                }
            })
            .sum();
        sum.min(f64::from(MAX_RISK_SCORE))
    }

    /// Level for an integer score under this scorer's thresholds.
    #[must_use]
    pub fn classify(&self, risk_score: u8) -> RiskLevel {
        self.config.thresholds.classify(risk_score)
    }

    /// Confidence of the investigation.
    #[must_use]
    pub fn confidence(&self, findings: &[Finding], coverage: &SourceCoverage) -> f64 {
        let base = if findings.is_empty() {
            self.config.empty_confidence
        } else {
            let total: f64 = findings
                .iter()
                .map(|f| f.effective_confidence(self.config.default_finding_confidence))
                .sum();
            total / findings.len() as f64
        };
        (base * coverage.fraction()).clamp(0.0, 1.0)
    }

    /// Score a merged finding list.
    #[must_use]
    pub fn score(&self, findings: &[Finding], coverage: &SourceCoverage) -> ScoreReport {
        let raw_score = self.raw_score(findings);
        let risk_score = raw_score.floor() as u8;
        let risk_level = self.classify(risk_score);

        ScoreReport {
            raw_score,
            risk_score,
            risk_level,
            confidence: self.confidence(findings, coverage),
            recommendations: recommendations(findings, risk_level, coverage),
            summary: summary(findings, risk_score, risk_level, coverage),
        }
    }
}

/// Level for a score under the default thresholds.
#[must_use]
pub fn risk_level_for(risk_score: u8) -> RiskLevel {
    LevelThresholds::default().classify(risk_score)
}

// =============================================================================
// TEMPLATES
// =============================================================================

/// Recommendation for a known procurement red-flag type.
fn known_recommendation(type_key: &str) -> Option<&'static str> {
    let text = match type_key {
        "single_bidder" => {
            "Verify why only one bidder participated: check publication channels, deadlines and qualification criteria."
        }
        "price_anomaly" | "price_inflation" | "overpricing" => {
            "Compare the awarded price with historical unit prices for the same items."
        }
        "bid_clustering" | "bid_rigging" | "bid_rotation" => {
            "Examine bid amounts and submission times for signs of coordinated bidding."
        }
        "registry_mismatch" => "Reconcile the tender record with the official registry entry.",
        "adverse_media" => "Review the cited news coverage and archive the original sources.",
        "shared_ownership" | "affiliated_bidders" => {
            "Map the ownership links between bidders and the contracting authority."
        }
        "conflict_of_interest" => {
            "Check the evaluation committee's declared interests against supplier ownership."
        }
        "document_similarity" => {
            "Compare bid documents for copied text or shared authorship metadata."
        }
        "short_deadline" => "Confirm the submission period met the statutory minimum.",
        "new_company" => "Confirm the supplier's trading history and capacity to deliver.",
        "contract_amendment" => {
            "Review post-award amendments for price increases or scope changes."
        }
        "synthesis" => {
            "Check the language-model synthesis against the underlying findings before acting on it."
        }
        _ => return None,
    };
    Some(text)
}

fn recommendations(findings: &[Finding], level: RiskLevel, coverage: &SourceCoverage) -> Vec<String> {
    let mut sources_by_type: BTreeMap<String, BTreeSet<Source>> = BTreeMap::new();
    for finding in findings {
        sources_by_type
            .entry(finding.type_key())
            .or_default()
            .insert(finding.source);
    }

    let mut lines: Vec<String> = sources_by_type
        .iter()
        .map(|(type_key, sources)| match known_recommendation(type_key) {
            Some(text) => text.to_string(),
            None => {
                let sources: Vec<&str> = sources.iter().map(Source::as_str).collect();
                format!(
                    "Review the '{}' findings reported by {}.",
                    type_key,
                    sources.join(", ")
                )
            }
        })
        .collect();

    match level {
        RiskLevel::Critical => lines.push(
            "Open an investigation case and escalate to the oversight unit.".to_string(),
        ),
        RiskLevel::High => {
            lines.push("Open an investigation case for analyst review.".to_string());
        }
        RiskLevel::Medium => lines.push(
            "Monitor the subject and re-run the investigation when new data arrives.".to_string(),
        ),
        RiskLevel::Low | RiskLevel::Minimal => {}
    }

    let missing: BTreeSet<Source> = coverage.missing.iter().copied().collect();
    for source in missing {
        lines.push(format!(
            "Re-run the investigation once the {source} source is reachable."
        ));
    }

    lines
}

fn summary(findings: &[Finding], score: u8, level: RiskLevel, coverage: &SourceCoverage) -> String {
    let answered = coverage.answered();
    if findings.is_empty() {
        return format!(
            "{} risk (score {}/100): no findings from {} of {} source(s).",
            capitalize(level.as_str()),
            score,
            answered,
            coverage.registered
        );
    }

    let sources: BTreeSet<Source> = findings.iter().map(|f| f.source).collect();
    let types: BTreeSet<String> = findings.iter().map(Finding::type_key).collect();
    let corroborated = findings.iter().filter(|f| f.corroborated).count();

    format!(
        "{} risk (score {}/100): {} finding(s) from {} source(s), {} corroborated; {} of {} source(s) answered. Types: {}.",
        capitalize(level.as_str()),
        score,
        findings.len(),
        sources.len(),
        corroborated,
        answered,
        coverage.registered,
        types.into_iter().collect::<Vec<_>>().join(", ")
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(source: Source, finding_type: &str, severity: Severity, corroborated: bool) -> Finding {
        let mut f = Finding::new(source, finding_type, "observed", severity);
        f.corroborated = corroborated;
        f
    }

    #[test]
    fn single_high_finding_is_low_risk() {
        let scorer = RiskScorer::default();
        let findings = [finding(Source::History, "single_bidder", Severity::High, false)];
        let report = scorer.score(&findings, &SourceCoverage::complete(6));

        assert_eq!(report.risk_score, 10);
        assert_eq!(report.risk_level, RiskLevel::Low);
    }

    #[test]
    fn corroborated_pair_stays_low() {
        let scorer = RiskScorer::default();
        let findings = [
            finding(Source::History, "single_bidder", Severity::High, true),
            finding(Source::Registry, "single_bidder", Severity::High, true),
        ];
        let report = scorer.score(&findings, &SourceCoverage::complete(6));

        assert!((report.raw_score - 25.0).abs() < 1e-9);
        assert_eq!(report.risk_score, 25);
        assert_eq!(report.risk_level, RiskLevel::Low);
    }

    #[test]
    fn three_corroborated_criticals_are_high() {
        let scorer = RiskScorer::default();
        let findings = [
            finding(Source::History, "bid_rigging", Severity::Critical, true),
            finding(Source::Registry, "bid_rigging", Severity::Critical, true),
            finding(Source::Ownership, "bid_rigging", Severity::Critical, true),
        ];
        let report = scorer.score(&findings, &SourceCoverage::complete(6));

        assert!((report.raw_score - 75.0).abs() < 1e-9);
        assert_eq!(report.risk_score, 75);
        assert_eq!(report.risk_level, RiskLevel::High);
    }

    #[test]
    fn boundary_between_high_and_critical() {
        let thresholds = LevelThresholds::default();
        assert_eq!(thresholds.classify(79), RiskLevel::High);
        assert_eq!(thresholds.classify(80), RiskLevel::Critical);
    }

    #[test]
    fn every_band_boundary() {
        assert_eq!(risk_level_for(0), RiskLevel::Minimal);
        assert_eq!(risk_level_for(9), RiskLevel::Minimal);
        assert_eq!(risk_level_for(10), RiskLevel::Low);
        assert_eq!(risk_level_for(29), RiskLevel::Low);
        assert_eq!(risk_level_for(30), RiskLevel::Medium);
        assert_eq!(risk_level_for(54), RiskLevel::Medium);
        assert_eq!(risk_level_for(55), RiskLevel::High);
        assert_eq!(risk_level_for(100), RiskLevel::Critical);
        assert_eq!(risk_level_for(u8::MAX), RiskLevel::Critical);
    }

    #[test]
    fn score_is_capped_at_one_hundred() {
        let scorer = RiskScorer::default();
        let findings: Vec<Finding> = (0..10)
            .map(|_| finding(Source::Web, "adverse_media", Severity::Critical, true))
            .collect();
        let report = scorer.score(&findings, &SourceCoverage::complete(6));

        assert!((report.raw_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(report.risk_score, 100);
        assert_eq!(report.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn seventy_nine_versus_eighty_through_the_scorer() {
        // 3 criticals + 1 high + 1 medium + 2 lows = 79; a second medium
        // instead of the lows = 80.
        let scorer = RiskScorer::default();
        let mut findings: Vec<Finding> = (0..3)
            .map(|_| finding(Source::History, "bid_rigging", Severity::Critical, false))
            .collect();
        findings.push(finding(Source::Registry, "single_bidder", Severity::High, false));
        findings.push(finding(Source::Web, "adverse_media", Severity::Medium, false));
        findings.push(finding(Source::Web, "short_deadline", Severity::Low, false));
        findings.push(finding(Source::Documents, "new_company", Severity::Low, false));

        let below = scorer.score(&findings, &SourceCoverage::complete(6));
        assert_eq!(below.risk_score, 79);
        assert_eq!(below.risk_level, RiskLevel::High);

        findings.truncate(5);
        findings.push(finding(Source::Ownership, "shared_director", Severity::Medium, false));
        let at = scorer.score(&findings, &SourceCoverage::complete(6));
        assert_eq!(at.risk_score, 80);
        assert_eq!(at.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn empty_investigation_is_minimal_with_low_nonzero_confidence() {
        let scorer = RiskScorer::default();
        let report = scorer.score(&[], &SourceCoverage::complete(6));

        assert_eq!(report.risk_score, 0);
        assert_eq!(report.risk_level, RiskLevel::Minimal);
        assert!(report.confidence > 0.0);
        assert!(report.confidence < 0.5);
        assert!(report.summary.contains("no findings from 6 of 6"));
    }

    #[test]
    fn confidence_scales_with_answered_sources() {
        let scorer = RiskScorer::default();
        let findings = [finding(Source::History, "single_bidder", Severity::High, false).with_confidence(0.8)];
        let full = scorer.confidence(&findings, &SourceCoverage::complete(4));
        let half = scorer.confidence(
            &findings,
            &SourceCoverage {
                registered: 4,
                missing: vec![Source::Web, Source::Registry],
            },
        );

        assert!((full - 0.8).abs() < 1e-9);
        assert!((half - 0.4).abs() < 1e-9);
    }

    #[test]
    fn missing_confidence_defaults_to_half() {
        let scorer = RiskScorer::default();
        let findings = [
            finding(Source::History, "single_bidder", Severity::High, false).with_confidence(1.0),
            finding(Source::Web, "adverse_media", Severity::Low, false),
        ];
        let confidence = scorer.confidence(&findings, &SourceCoverage::complete(2));
        assert!((confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn no_registered_sources_means_zero_confidence() {
        let scorer = RiskScorer::default();
        assert!(scorer.confidence(&[], &SourceCoverage::complete(0)).abs() < f64::EPSILON);
    }

    #[test]
    fn one_recommendation_per_distinct_type() {
        let scorer = RiskScorer::default();
        let findings = [
            finding(Source::History, "single_bidder", Severity::Low, false),
            finding(Source::Registry, "single_bidder", Severity::Low, false),
            finding(Source::Web, "unusual_pattern", Severity::Low, false),
        ];
        let report = scorer.score(&findings, &SourceCoverage::complete(3));

        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations[0].starts_with("Verify why only one bidder"));
        assert_eq!(
            report.recommendations[1],
            "Review the 'unusual_pattern' findings reported by web."
        );
    }

    #[test]
    fn missing_sources_add_rerun_recommendations() {
        let scorer = RiskScorer::default();
        let coverage = SourceCoverage {
            registered: 3,
            missing: vec![Source::Registry],
        };
        let report = scorer.score(&[], &coverage);
        assert_eq!(
            report.recommendations,
            vec!["Re-run the investigation once the registry source is reachable.".to_string()]
        );
    }

    #[test]
    fn synthesis_findings_score_like_any_other() {
        let scorer = RiskScorer::default();
        let synthesis = [finding(Source::Synthesis, "synthesis", Severity::High, false)];
        let history = [finding(Source::History, "synthesis", Severity::High, false)];
        assert_eq!(
            scorer.raw_score(&synthesis),
            scorer.raw_score(&history)
        );
    }

    #[test]
    fn summary_is_deterministic() {
        let scorer = RiskScorer::default();
        let findings = [
            finding(Source::Web, "adverse_media", Severity::Medium, false),
            finding(Source::History, "single_bidder", Severity::High, false),
        ];
        let a = scorer.score(&findings, &SourceCoverage::complete(5));
        let b = scorer.score(&findings, &SourceCoverage::complete(5));
        assert_eq!(a.summary, b.summary);
        assert!(a.summary.starts_with("Low risk (score 15/100)"));
        assert!(a.summary.contains("Types: adverse_media, single_bidder."));
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut config = ScoringConfig::default();
        config.thresholds.high = config.thresholds.medium;
        assert!(RiskScorer::new(config).is_err());

        let mut config = ScoringConfig::default();
        config.weights.low = 20.0;
        assert!(RiskScorer::new(config).is_err());

        let mut config = ScoringConfig::default();
        config.corroboration_multiplier = 0.5;
        assert!(RiskScorer::new(config).is_err());

        let mut config = ScoringConfig::default();
        config.empty_confidence = 1.5;
        assert!(RiskScorer::new(config).is_err());

        assert!(RiskScorer::new(ScoringConfig::default()).is_ok());
    }
}

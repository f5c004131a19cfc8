//! # Investigation Results
//!
//! The value returned for every investigation, fresh or cached.

use crate::finding::{Finding, InvestigationQuery};
use crate::scoring::{ScoreReport, SourceCoverage};
use crate::{RiskLevel, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scored outcome of one investigation.
///
/// `findings` is fixed at construction; the only field that changes after
/// that is `cached`, flipped when the value is served from the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub subject: InvestigationQuery,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    /// Capped weighted sum before truncation to `risk_score`.
    pub raw_score: f64,
    pub confidence: f64,
    pub findings: Vec<Finding>,
    /// Every registered source, `true` when it answered before the deadline.
    pub sources_checked: BTreeMap<Source, bool>,
    pub recommendations: Vec<String>,
    pub summary: String,
    pub data_quality_gaps: Vec<String>,
    /// Narrative returned by the synthesis source, when one answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<String>,
    pub investigated_at: DateTime<Utc>,
    pub cached: bool,
}

impl InvestigationResult {
    /// Combine merged findings, their score and the per-source outcome.
    ///
    /// `gaps` holds one human-readable line per source that did not answer.
    #[must_use]
    pub fn assemble(
        subject: InvestigationQuery,
        findings: Vec<Finding>,
        score: ScoreReport,
        sources_checked: BTreeMap<Source, bool>,
        gaps: Vec<String>,
        synthesis: Option<String>,
        investigated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject,
            risk_score: score.risk_score,
            risk_level: score.risk_level,
            raw_score: score.raw_score,
            confidence: score.confidence,
            findings,
            sources_checked,
            recommendations: score.recommendations,
            summary: score.summary,
            data_quality_gaps: gaps,
            synthesis,
            investigated_at,
            cached: false,
        }
    }

    /// Copy of this result as served from the cache.
    #[must_use]
    pub fn as_cached(&self) -> Self {
        Self {
            cached: true,
            ..self.clone()
        }
    }

    /// Coverage view of `sources_checked`, as consumed by the scorer.
    #[must_use]
    pub fn coverage(&self) -> SourceCoverage {
        SourceCoverage {
            registered: self.sources_checked.len(),
            missing: self
                .sources_checked
                .iter()
                .filter(|(_, answered)| !**answered)
                .map(|(source, _)| *source)
                .collect(),
        }
    }

    /// Whether every registered source failed.
    #[must_use]
    pub fn all_sources_failed(&self) -> bool {
        !self.sources_checked.is_empty() && self.sources_checked.values().all(|answered| !answered)
    }
}

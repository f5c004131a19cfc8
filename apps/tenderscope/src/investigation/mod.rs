//! # Investigation Module
//!
//! Everything that talks to evidence sources.
//!
//! ## Components
//!
//! - [`SourceInvestigator`]: one evidence source (history, registry, web, ...)
//! - [`Synthesizer`]: the language-model synthesis collaborator
//! - [`Orchestrator`]: concurrent fan-out under one deadline, then scoring
//! - [`InvestigationCache`]: TTL cache with one computation per subject
//!
//! The scoring itself lives in `tenderscope-core`; this module only decides
//! which findings reach the scorer and when to stop waiting for them.

pub mod cache;
pub mod http;
pub mod orchestrator;

pub use cache::InvestigationCache;
pub use http::{HttpInvestigator, HttpSynthesizer};
pub use orchestrator::Orchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tenderscope_core::{EngineError, Finding, InvestigationQuery, Severity, Source};
use thiserror::Error;
use tokio::time::Instant;

// =============================================================================
// CAPABILITIES
// =============================================================================

/// Failure of one source during one investigation.
#[derive(Debug, Error)]
pub enum InvestigatorError {
    /// The deadline passed; `partial` holds whatever was gathered before it.
    #[error("timed out with {} partial findings", partial.len())]
    Timeout { partial: Vec<Finding> },

    /// The source could not answer at all.
    #[error("{0}")]
    Unavailable(String),
}

impl InvestigatorError {
    /// Split into the partial findings and the error as reported for `origin`.
    #[must_use]
    pub fn into_parts(self, origin: Source) -> (Vec<Finding>, EngineError) {
        let reason = self.to_string();
        let partial = match self {
            Self::Timeout { partial } => partial,
            Self::Unavailable(_) => Vec::new(),
        };
        (partial, EngineError::SourceUnavailable { origin, reason })
    }
}

/// One independent evidence source.
///
/// Implementations must not run past `deadline` (returning
/// [`InvestigatorError::Timeout`] with partial findings instead), return an
/// empty list when they legitimately find nothing and tag every finding with
/// [`SourceInvestigator::source`].
#[async_trait]
pub trait SourceInvestigator: Send + Sync {
    fn source(&self) -> Source;

    async fn investigate(
        &self,
        query: &InvestigationQuery,
        deadline: Instant,
    ) -> Result<Vec<Finding>, InvestigatorError>;
}

/// Narrative and optional findings returned by the synthesis collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub narrative: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

/// The language-model synthesis collaborator.
///
/// It receives the findings already collected from the other sources, not
/// raw documents. Its findings are tagged [`Source::Synthesis`] and scored
/// like any other.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        query: &InvestigationQuery,
        findings: &[Finding],
        deadline: Instant,
    ) -> Result<Synthesis, InvestigatorError>;
}

/// A finding as produced outside the engine, before it is tagged with the
/// source that reported it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UntaggedFinding {
    pub finding_type: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl UntaggedFinding {
    /// Attribute this finding to `source`. Confidence is clamped to `[0, 1]`.
    #[must_use]
    pub fn tag(self, source: Source) -> Finding {
        let mut finding = Finding::new(source, self.finding_type, self.description, self.severity);
        finding.evidence = self.evidence;
        match self.confidence {
            Some(c) => finding.with_confidence(c),
            None => finding,
        }
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Incremental completion of one investigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { sources: Vec<Source> },
    SourceCompleted { source: Source, findings: usize },
    SourceFailed { source: Source, reason: String },
    Finished { risk_score: u8, cached: bool },
}

// =============================================================================
// STATIC INVESTIGATOR
// =============================================================================

/// A source that answers every query with the same findings.
///
/// Used for offline demos (`investigate --fixtures`) and tests. An optional
/// delay simulates a slow collaborator; the delay ignores the deadline, so
/// the orchestrator has to cut it off.
#[derive(Debug, Clone)]
pub struct StaticInvestigator {
    source: Source,
    findings: Vec<Finding>,
    delay: Option<Duration>,
}

impl StaticInvestigator {
    #[must_use]
    pub fn new(source: Source, findings: Vec<Finding>) -> Self {
        Self {
            source,
            findings,
            delay: None,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SourceInvestigator for StaticInvestigator {
    fn source(&self) -> Source {
        self.source
    }

    async fn investigate(
        &self,
        _query: &InvestigationQuery,
        _deadline: Instant,
    ) -> Result<Vec<Finding>, InvestigatorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .findings
            .iter()
            .cloned()
            .map(|f| Finding {
                source: self.source,
                ..f
            })
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tenderscope_core::SubjectType;

    #[test]
    fn timeout_keeps_partial_findings() {
        let partial = vec![Finding::new(Source::Web, "news_mention", "local press", Severity::Low)];
        let (kept, error) = InvestigatorError::Timeout { partial }.into_parts(Source::Web);
        assert_eq!(kept.len(), 1);
        assert_eq!(error.to_string(), "web unavailable: timed out with 1 partial findings");
        assert_eq!(error.kind(), "source_unavailable");
    }

    #[test]
    fn unavailable_has_no_partial_findings() {
        let (kept, error) =
            InvestigatorError::Unavailable("HTTP 503".to_string()).into_parts(Source::Registry);
        assert!(kept.is_empty());
        assert_eq!(error.to_string(), "registry unavailable: HTTP 503");
    }

    #[test]
    fn progress_events_are_tagged() {
        let event = ProgressEvent::SourceCompleted {
            source: Source::History,
            findings: 2,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"event": "source_completed", "source": "history", "findings": 2})
        );
    }

    #[tokio::test]
    async fn static_investigator_tags_its_source() {
        let investigator = StaticInvestigator::new(
            Source::Ownership,
            vec![Finding::new(Source::Web, "shared_owner", "same director", Severity::High)],
        );
        let query = InvestigationQuery::new(SubjectType::Company, "Acme Build LLC").expect("query");
        let findings = investigator
            .investigate(&query, Instant::now() + Duration::from_secs(1))
            .await
            .expect("findings");
        assert_eq!(findings[0].source, Source::Ownership);
    }
}

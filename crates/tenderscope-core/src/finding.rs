//! # Findings and Queries
//!
//! A [`Finding`] is one discrete observation produced by a single source about
//! the investigated subject. An [`InvestigationQuery`] names that subject.
//!
//! Queries are validated at construction and normalized into a [`CacheKey`],
//! so "Acme  Ltd" and "acme ltd" share one cached investigation.

use crate::primitives::MAX_SUBJECT_KEY_LENGTH;
use crate::{EngineError, Severity, Source, SubjectType};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// FINDING
// =============================================================================

/// One observation from one source.
///
/// Produced by a source investigator and not edited afterwards; the
/// orchestrator only derives new values from it (re-tagging, corroboration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// The source that produced this finding.
    pub source: Source,
    /// Machine-readable red-flag type, e.g. `single_bidder`.
    pub finding_type: String,
    /// Human-readable description.
    pub description: String,
    pub severity: Severity,
    /// Ordered supporting references (URLs, document ids, snippets).
    #[serde(default)]
    pub evidence: Vec<String>,
    /// The producer's own confidence in `[0, 1]`, if it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Set by the orchestrator when another source reported the same type.
    #[serde(default)]
    pub corroborated: bool,
}

impl Finding {
    /// Create an uncorroborated finding without evidence or confidence.
    #[must_use]
    pub fn new(
        source: Source,
        finding_type: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            source,
            finding_type: finding_type.into(),
            description: description.into(),
            severity,
            evidence: Vec::new(),
            confidence: None,
            corroborated: false,
        }
    }

    /// Append one supporting reference.
    #[must_use]
    pub fn with_evidence(mut self, item: impl Into<String>) -> Self {
        self.evidence.push(item.into());
        self
    }

    /// Attach the producer's confidence. Values are clamped to `[0, 1]`;
    /// non-finite values are discarded.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.is_finite().then(|| confidence.clamp(0.0, 1.0));
        self
    }

    /// Normalized finding type used for corroboration and templating.
    #[must_use]
    pub fn type_key(&self) -> String {
        normalize_type(&self.finding_type)
    }

    /// Confidence clamped to `[0, 1]`, or `default` when absent or not finite.
    #[must_use]
    pub fn effective_confidence(&self, default: f64) -> f64 {
        match self.confidence {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            _ => default,
        }
    }
}

/// Lower-case, trim, and fold spaces/dashes into underscores.
#[must_use]
pub fn normalize_type(finding_type: &str) -> String {
    finding_type
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

// =============================================================================
// QUERY
// =============================================================================

/// The subject of an investigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationQuery {
    pub subject_type: SubjectType,
    pub subject_key: String,
}

impl InvestigationQuery {
    /// Build and validate a query.
    ///
    /// The key is trimmed; it must be non-empty, at most
    /// `MAX_SUBJECT_KEY_LENGTH` bytes and free of control characters.
    pub fn new(subject_type: SubjectType, subject_key: impl AsRef<str>) -> Result<Self, EngineError> {
        let key = subject_key.as_ref().trim();
        if key.is_empty() {
            return Err(EngineError::InvalidQuery("subject key is empty".to_string()));
        }
        if key.len() > MAX_SUBJECT_KEY_LENGTH {
            return Err(EngineError::InvalidQuery(format!(
                "subject key length {} exceeds maximum {} bytes",
                key.len(),
                MAX_SUBJECT_KEY_LENGTH
            )));
        }
        if key.chars().any(char::is_control) {
            return Err(EngineError::InvalidQuery(
                "subject key contains control characters".to_string(),
            ));
        }
        Ok(Self {
            subject_type,
            subject_key: key.to_string(),
        })
    }

    /// Parse both parts from strings, e.g. from a CLI or URL path.
    pub fn parse(subject_type: &str, subject_key: &str) -> Result<Self, EngineError> {
        let subject_type = subject_type
            .parse::<SubjectType>()
            .map_err(|e| EngineError::InvalidQuery(e.to_string()))?;
        Self::new(subject_type, subject_key)
    }

    /// Re-check a query that arrived through deserialization.
    pub fn validated(self) -> Result<Self, EngineError> {
        Self::new(self.subject_type, &self.subject_key)
    }

    /// The normalized cache key for this subject.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        let key = self
            .subject_key
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        CacheKey {
            subject_type: self.subject_type,
            key,
        }
    }
}

impl fmt::Display for InvestigationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.subject_type, self.subject_key)
    }
}

/// Normalized `(subject_type, subject_key)` pair keying the investigation cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub subject_type: SubjectType,
    pub key: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.key)
    }
}

// =============================================================================
// TESTS
// =============================================================================

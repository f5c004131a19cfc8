//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the engine:
//! - Record identifiers (`CaseId`, `EvidenceId`, `NoteId`, `TimelineId`, `TipId`)
//! - Closed enums for sources, severities, risk levels and workflow states
//! - Free-form metadata (`Metadata`)
//! - Error types (`EngineError`)
//!
//! ## Determinism Guarantees
//!
//! All enums implement `Ord` so they can key `BTreeMap`/`BTreeSet`, and every
//! enum has exactly one wire spelling (`snake_case`) shared by serde,
//! `Display` and `FromStr`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of an investigation case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub u64);

/// Identifier of an evidence record attached to a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(pub u64);

/// Identifier of an analyst note attached to a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub u64);

/// Identifier of a timeline entry. Globally increasing across all cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelineId(pub u64);

/// Identifier of a whistleblower tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "case #{}", self.0)
    }
}

impl fmt::Display for TipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tip #{}", self.0)
    }
}

// =============================================================================
// ID SEQUENCE
// =============================================================================

/// Monotonic counters for every record family.
///
/// Stores copy the sequence, allocate from the copy while building a write,
/// and only replace their own sequence after the write commits. A rejected
/// mutation therefore never burns an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdSequence {
    pub next_case: u64,
    pub next_evidence: u64,
    pub next_note: u64,
    pub next_timeline: u64,
    pub next_tip: u64,
}

impl IdSequence {
    /// Sequence for an empty store. Identifiers start at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_case: 1,
            next_evidence: 1,
            next_note: 1,
            next_timeline: 1,
            next_tip: 1,
        }
    }

    pub fn case(&mut self) -> CaseId {
        CaseId(bump(&mut self.next_case))
    }

    pub fn evidence(&mut self) -> EvidenceId {
        EvidenceId(bump(&mut self.next_evidence))
    }

    pub fn note(&mut self) -> NoteId {
        NoteId(bump(&mut self.next_note))
    }

    pub fn timeline(&mut self) -> TimelineId {
        TimelineId(bump(&mut self.next_timeline))
    }

    pub fn tip(&mut self) -> TipId {
        TipId(bump(&mut self.next_tip))
    }
}

fn bump(counter: &mut u64) -> u64 {
    let id = (*counter).max(1);
    *counter = id.saturating_add(1);
    id
}

// =============================================================================
// CLOSED ENUMS
// =============================================================================

/// Declares the string spelling of a closed enum once and derives
/// `as_str`, `ALL`, `Display` and `FromStr` from it.
macro_rules! wire_enum {
    ($name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration (and `Ord`) order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The wire spelling of this variant.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| EngineError::InvalidInput(format!("unknown {} '{}'", $label, s)))
            }
        }
    };
}

/// The closed set of evidence sources an investigation consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Historical tenders, prices and bidders.
    History,
    /// Official registry verification.
    Registry,
    /// Open-web and news search.
    Web,
    /// Company ownership / affiliation graph.
    Ownership,
    /// Full-text search over tender attachments.
    Documents,
    /// Language-model synthesis over already-collected findings.
    Synthesis,
}

wire_enum!(Source, "source" {
    History => "history",
    Registry => "registry",
    Web => "web",
    Ownership => "ownership",
    Documents => "documents",
    Synthesis => "synthesis",
});

/// Severity of a finding or evidence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

wire_enum!(Severity, "severity" {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// Classified risk of an investigated subject.
///
/// Ordered from least to most severe, so `a <= b` reads "a is no riskier than b".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

wire_enum!(RiskLevel, "risk level" {
    Minimal => "minimal",
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// Kind of subject an investigation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Tender,
    Company,
    Institution,
}

wire_enum!(SubjectType, "subject type" {
    Tender => "tender",
    Company => "company",
    Institution => "institution",
});

/// Workflow state of an investigation case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    InProgress,
    Review,
    Closed,
    Archived,
}

wire_enum!(CaseStatus, "case status" {
    Open => "open",
    InProgress => "in_progress",
    Review => "review",
    Closed => "closed",
    Archived => "archived",
});

impl CaseStatus {
    /// `closed` and `archived` can only be left through an explicit reopen.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Archived)
    }

    /// Whether a plain status change from `self` to `next` is allowed.
    ///
    /// Reopening (`closed|archived -> open`) is deliberately not a plain
    /// status change and returns `false` here.
    #[must_use]
    pub const fn can_transition_to(&self, next: CaseStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::InProgress)
                | (Self::InProgress, Self::Review)
                | (Self::Review, Self::Closed)
                | (Self::Review, Self::InProgress)
                | (Self::Open | Self::InProgress | Self::Review, Self::Archived)
        )
    }
}

/// Priority of an investigation case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

wire_enum!(Priority, "priority" {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// Kind of evidence attached to a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Document,
    Financial,
    Behavioral,
    Statistical,
    Testimony,
    Other,
}

wire_enum!(EvidenceType, "evidence type" {
    Document => "document",
    Financial => "financial",
    Behavioral => "behavioral",
    Statistical => "statistical",
    Testimony => "testimony",
    Other => "other",
});

/// Category of a whistleblower tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipCategory {
    BidRigging,
    Bribery,
    ConflictOfInterest,
    Fraud,
    Other,
}

wire_enum!(TipCategory, "tip category" {
    BidRigging => "bid_rigging",
    Bribery => "bribery",
    ConflictOfInterest => "conflict_of_interest",
    Fraud => "fraud",
    Other => "other",
});

/// Triage urgency of a tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

wire_enum!(Urgency, "urgency" {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl Urgency {
    /// Evidence severity used when a tip of this urgency is linked into a case.
    #[must_use]
    pub const fn as_severity(&self) -> Severity {
        match self {
            Self::Low => Severity::Low,
            Self::Medium => Severity::Medium,
            Self::High => Severity::High,
            Self::Critical => Severity::Critical,
        }
    }
}

/// Workflow state of a whistleblower tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipStatus {
    Submitted,
    UnderReview,
    Investigating,
    Resolved,
    Dismissed,
    Linked,
}

wire_enum!(TipStatus, "tip status" {
    Submitted => "submitted",
    UnderReview => "under_review",
    Investigating => "investigating",
    Resolved => "resolved",
    Dismissed => "dismissed",
    Linked => "linked",
});

impl TipStatus {
    /// Whether an analyst patch may move a tip from `self` to `next`.
    ///
    /// `linked` is never reachable this way; only `link_tip` sets it.
    #[must_use]
    pub const fn can_transition_to(&self, next: TipStatus) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::UnderReview | Self::Dismissed)
                | (
                    Self::UnderReview,
                    Self::Investigating | Self::Resolved | Self::Dismissed
                )
                | (Self::Investigating, Self::Resolved | Self::Dismissed)
        )
    }

    /// States from which a tip may be linked into a case.
    #[must_use]
    pub const fn is_linkable(&self) -> bool {
        matches!(self, Self::UnderReview | Self::Investigating)
    }
}

// =============================================================================
// METADATA
// =============================================================================

/// Free-form key/value data attached to evidence and tip triage.
///
/// Human-readable formats (JSON, TOML) see a plain map. Compact binary
/// formats, which cannot describe arbitrary JSON values, receive the map
/// as one embedded JSON string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata(pub BTreeMap<String, serde_json::Value>);

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.0.serialize(serializer)
        } else {
            let json = serde_json::to_string(&self.0).map_err(serde::ser::Error::custom)?;
            serializer.serialize_str(&json)
        }
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            BTreeMap::deserialize(deserializer).map(Self)
        } else {
            let json = String::deserialize(deserializer)?;
            serde_json::from_str(&json)
                .map(Self)
                .map_err(serde::de::Error::custom)
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors surfaced by the engine.
///
/// - No silent failures
/// - Every case/tip mutation is validated before anything is written, so an
///   error never leaves partially persisted state behind
#[derive(Debug, Error)]
pub enum EngineError {
    /// One evidence source failed or timed out. Recovered locally by the
    /// orchestrator and surfaced only as a data-quality gap.
    #[error("{origin} unavailable: {reason}")]
    SourceUnavailable { origin: Source, reason: String },

    /// The investigation subject is malformed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A request field failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested case does not exist.
    #[error("Case not found: {0}")]
    CaseNotFound(CaseId),

    /// The requested tip does not exist.
    #[error("Tip not found: {0}")]
    TipNotFound(TipId),

    /// The requested state change is not allowed from the current state.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The case changed since the caller last read it.
    #[error("Concurrent modification of {case}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        case: CaseId,
        expected: u64,
        actual: u64,
    },

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Short machine-readable name of the error class.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::InvalidQuery(_) => "invalid_query",
            Self::InvalidInput(_) => "invalid_input",
            Self::CaseNotFound(_) => "case_not_found",
            Self::TipNotFound(_) => "tip_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
        }
    }

    pub(crate) fn transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

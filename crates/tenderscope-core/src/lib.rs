//! # tenderscope-core
//!
//! The deterministic risk and case engine for Tenderscope - THE LOGIC.
//!
//! This crate holds everything about procurement risk investigations that
//! does not need a network or a clock of its own:
//! - Findings, their corroboration and the risk scorer
//! - Investigation cases with their state machine and timeline
//! - Whistleblower tips, their triage and the link into a case
//! - In-memory and redb-backed stores
//!
//! ## Architectural Constraints
//!
//! - NO async, NO network dependencies (pure Rust)
//! - Timestamps are passed in; only the [`Ledger`] façade reads the clock
//! - Every tunable is an explicit configuration value, never global state

// =============================================================================
// MODULES
// =============================================================================

pub mod case;
pub mod corroboration;
pub mod finding;
pub mod ledger;
pub mod primitives;
pub mod report;
pub mod scoring;
pub mod storage;
pub mod store;
pub mod tip;
pub mod triage;
pub mod types;

mod validate;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CaseId, CaseStatus, EngineError, EvidenceId, EvidenceType, IdSequence, Metadata, NoteId,
    Priority, RiskLevel, Severity, Source, SubjectType, TimelineId, TipCategory, TipId, TipStatus,
    Urgency,
};

// =============================================================================
// RE-EXPORTS: Investigation
// =============================================================================

pub use corroboration::{corroborates, merge_findings};
pub use finding::{CacheKey, Finding, InvestigationQuery};
pub use report::InvestigationResult;
pub use scoring::{
    LevelThresholds, RiskScorer, ScoreReport, ScoringConfig, SeverityWeights, SourceCoverage,
};

// =============================================================================
// RE-EXPORTS: Cases and Tips
// =============================================================================

pub use case::{
    Case, CaseFilter, CaseMutation, EntityLink, Evidence, NewCase, NewEvidence, Note, TenderLink,
    TimelineEntry,
};
pub use ledger::{Ledger, LedgerStats, StorageBackend};
pub use storage::RedbStore;
pub use store::{BatchOutcome, CaseStore, LinkOutcome, MemoryStore, MutationOutcome, TipStore};
pub use tip::{
    ExtractedEntity, MatchedTender, Tip, TipFilter, TipPatch, TipSubmission, TriageAssessment,
};
pub use triage::{HeuristicTriage, TipTriage, TriageConfig};

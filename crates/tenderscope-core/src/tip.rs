//! # Whistleblower Tips
//!
//! The tip aggregate: intake, analyst review and the one-shot link into a case.
//!
//! ```text
//! submitted ──► under_review ──► investigating ──► resolved
//!     │              │                │
//!     └──────────────┴────────────────┴──► dismissed
//!
//! under_review | investigating ──link──► linked ──unlink──► investigating
//! ```
//!
//! `linked_case_id` is set if and only if the status is `linked`. Triage
//! output is written once at intake and never edited; analysts may only
//! override urgency and category and keep a free-text note.

use crate::case::{AppliedChange, Case, NewEvidence, action};
use crate::types::{CaseId, IdSequence, TipId};
use crate::{
    CaseStatus, EngineError, EvidenceType, Metadata, TipCategory, TipStatus, Urgency, validate,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evidence `source_module` used for linked tips.
pub const TIP_SOURCE_MODULE: &str = "whistleblower";

// =============================================================================
// TRIAGE OUTPUT
// =============================================================================

/// A named entity found in a tip's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// A tender the tip appears to refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedTender {
    pub tender_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// What a triage collaborator computed for a tip at intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageAssessment {
    /// Score in `[0, 1]`, if the collaborator produced one.
    pub score: Option<f64>,
    pub urgency: Urgency,
    #[serde(default)]
    pub extracted_entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub matched_tenders: Vec<MatchedTender>,
    #[serde(default)]
    pub details: Metadata,
}

impl Default for TriageAssessment {
    fn default() -> Self {
        Self {
            score: None,
            urgency: Urgency::Medium,
            extracted_entities: Vec::new(),
            matched_tenders: Vec::new(),
            details: Metadata::new(),
        }
    }
}

// =============================================================================
// TIP
// =============================================================================

/// Anonymous intake form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipSubmission {
    pub category: TipCategory,
    pub description: String,
}

/// A whistleblower tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    pub id: TipId,
    pub category: TipCategory,
    pub description: String,
    pub triage_score: Option<f64>,
    pub urgency: Urgency,
    pub status: TipStatus,
    pub extracted_entities: Vec<ExtractedEntity>,
    pub matched_tenders: Vec<MatchedTender>,
    pub triage_details: Metadata,
    pub analyst_note: Option<String>,
    pub linked_case_id: Option<CaseId>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Analyst edits. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipPatch {
    #[serde(default)]
    pub status: Option<TipStatus>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub category: Option<TipCategory>,
    /// A blank note clears the existing one.
    #[serde(default)]
    pub analyst_note: Option<String>,
}

impl TipPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.urgency.is_none()
            && self.category.is_none()
            && self.analyst_note.is_none()
    }
}

impl Tip {
    /// Validate a submission and store the triage output with it.
    pub fn submit(
        submission: TipSubmission,
        assessment: TriageAssessment,
        ids: &mut IdSequence,
        at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let description = validate::text("description", &submission.description, true)?;
        let triage_score = match assessment.score {
            Some(score) if !score.is_finite() => {
                return Err(EngineError::InvalidInput(
                    "triage score must be a finite number".to_string(),
                ));
            }
            other => other.map(|score| score.clamp(0.0, 1.0)),
        };

        Ok(Self {
            id: ids.tip(),
            category: submission.category,
            description,
            triage_score,
            urgency: assessment.urgency,
            status: TipStatus::Submitted,
            extracted_entities: assessment.extracted_entities,
            matched_tenders: assessment.matched_tenders,
            triage_details: assessment.details,
            analyst_note: None,
            linked_case_id: None,
            submitted_at: at,
            updated_at: at,
        })
    }

    /// Apply an analyst patch. Returns `false` when nothing changed.
    ///
    /// Restating the current status is accepted and ignored, so a client
    /// may resend the whole form.
    pub fn apply_patch(&mut self, patch: TipPatch, at: DateTime<Utc>) -> Result<bool, EngineError> {
        if patch.is_empty() {
            return Err(EngineError::InvalidInput("patch changes nothing".to_string()));
        }
        let status = patch.status.filter(|s| *s != self.status);
        if let Some(next) = status {
            if !self.status.can_transition_to(next) {
                return Err(EngineError::transition(self.status, next));
            }
        }
        let note = match patch.analyst_note {
            Some(note) => {
                let note = validate::text("analyst_note", &note, false)?;
                Some((!note.is_empty()).then_some(note))
            }
            None => None,
        };

        let mut changed = false;
        if let Some(next) = status {
            self.status = next;
            changed = true;
        }
        if let Some(urgency) = patch.urgency.filter(|u| *u != self.urgency) {
            self.urgency = urgency;
            changed = true;
        }
        if let Some(category) = patch.category.filter(|c| *c != self.category) {
            self.category = category;
            changed = true;
        }
        if let Some(note) = note.filter(|n| *n != self.analyst_note) {
            self.analyst_note = note;
            changed = true;
        }
        if changed {
            self.updated_at = at;
        }
        Ok(changed)
    }

    /// Evidence record describing this tip inside a case.
    #[must_use]
    pub fn as_evidence(&self) -> NewEvidence {
        let mut metadata = Metadata::new()
            .with("tip_id", self.id.0)
            .with("category", self.category.as_str())
            .with("urgency", self.urgency.as_str());
        if let Some(score) = self.triage_score {
            metadata = metadata.with("triage_score", score);
        }
        if !self.matched_tenders.is_empty() {
            let tenders: Vec<&str> = self.matched_tenders.iter().map(|t| t.tender_id.as_str()).collect();
            metadata = metadata.with("matched_tenders", tenders);
        }
        NewEvidence {
            evidence_type: EvidenceType::Testimony,
            source_module: TIP_SOURCE_MODULE.to_string(),
            title: format!("Whistleblower tip #{} ({})", self.id.0, self.category),
            description: self.description.clone(),
            severity: self.urgency.as_severity(),
            metadata,
        }
    }
}

// =============================================================================
// LINKING
// =============================================================================

/// Link `tip` into `case`, appending a testimony evidence record and one
/// `tip_linked` timeline entry to the case.
///
/// Both aggregates are left untouched on error. The caller persists the
/// tip, the case and the returned change in one write.
pub fn link(
    tip: &mut Tip,
    case: &mut Case,
    actor: Option<&str>,
    ids: &mut IdSequence,
    at: DateTime<Utc>,
) -> Result<AppliedChange, EngineError> {
    if !tip.status.is_linkable() {
        return Err(EngineError::transition(tip.status, TipStatus::Linked));
    }
    if case.status == CaseStatus::Archived {
        return Err(EngineError::InvalidTransition {
            from: format!("{} ({})", case.id, case.status),
            to: TipStatus::Linked.to_string(),
        });
    }
    let actor = validate::optional_label("actor", actor)?;

    let change = case.append_evidence(
        tip.as_evidence(),
        action::TIP_LINKED,
        format!("Tip #{} linked ({}, {} urgency)", tip.id.0, tip.category, tip.urgency),
        actor,
        ids,
        at,
    )?;
    tip.status = TipStatus::Linked;
    tip.linked_case_id = Some(case.id);
    tip.updated_at = at;
    Ok(change)
}

/// Undo a link: the tip returns to `investigating` and the former case
/// records a `tip_unlinked` entry. The evidence record stays.
pub fn unlink(
    tip: &mut Tip,
    case: &mut Case,
    actor: Option<&str>,
    ids: &mut IdSequence,
    at: DateTime<Utc>,
) -> Result<AppliedChange, EngineError> {
    if tip.status != TipStatus::Linked || tip.linked_case_id != Some(case.id) {
        return Err(EngineError::transition(tip.status, TipStatus::Investigating));
    }
    let actor = validate::optional_label("actor", actor)?;

    let change = case.annotate(
        action::TIP_UNLINKED,
        format!("Tip #{} unlinked", tip.id.0),
        actor,
        ids,
        at,
    );
    tip.status = TipStatus::Investigating;
    tip.linked_case_id = None;
    tip.updated_at = at;
    Ok(change)
}

// =============================================================================
// FILTER
// =============================================================================

/// Listing filter for tips. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipFilter {
    #[serde(default)]
    pub status: Option<TipStatus>,
    #[serde(default)]
    pub category: Option<TipCategory>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl TipFilter {
    #[must_use]
    pub fn matches(&self, tip: &Tip) -> bool {
        self.status.is_none_or(|s| s == tip.status)
            && self.category.is_none_or(|c| c == tip.category)
            && self.urgency.is_none_or(|u| u == tip.urgency)
    }

    #[must_use]
    pub fn cap(&self) -> usize {
        crate::primitives::capped_limit(self.limit)
    }
}

// =============================================================================
// TESTS
// =============================================================================

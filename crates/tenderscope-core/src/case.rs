//! # Investigation Cases
//!
//! The case aggregate, its status state machine and its timeline.
//!
//! ## Workflow
//!
//! ```text
//! open ──► in_progress ──► review ──► closed
//!   │           │  ▲          │
//!   │           │  └──────────┘
//!   └───────────┴─────────────┴──► archived
//!
//! closed | archived ──reopen──► open
//! ```
//!
//! ## Rules
//!
//! - Every applied mutation produces exactly one [`TimelineEntry`]
//! - Attaching a tender or entity that is already attached, or setting a
//!   field to its current value, is a no-op: no row, no timeline entry
//! - Notes, evidence, attachments, priority and assignee stay editable in
//!   every state, including `closed` and `archived`
//! - Validation happens before the aggregate is touched, so a rejected
//!   mutation leaves the case exactly as it was

use crate::types::{CaseId, EvidenceId, IdSequence, NoteId, TimelineId};
use crate::{CaseStatus, EngineError, EvidenceType, Metadata, Priority, Severity, validate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// RECORDS
// =============================================================================

/// A tender attached to a case, with the role it plays in the investigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderLink {
    pub tender_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// A company, person or institution attached to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    pub entity_id: String,
    pub entity_type: String,
    pub entity_name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Append-only evidence record of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub evidence_type: EvidenceType,
    /// Which part of the platform produced it, e.g. `investigation` or `whistleblower`.
    pub source_module: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// Append-only analyst note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row of a case's activity log.
///
/// Ordered by `id`. Ids increase globally, so a later entry of the same
/// case always sorts after an earlier one, whatever the wall clock said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: TimelineId,
    pub case_id: CaseId,
    pub action: String,
    pub actor: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Timeline action names.
pub mod action {
    pub const CASE_CREATED: &str = "case_created";
    pub const STATUS_CHANGED: &str = "status_changed";
    pub const CASE_REOPENED: &str = "case_reopened";
    pub const PRIORITY_CHANGED: &str = "priority_changed";
    pub const ASSIGNEE_CHANGED: &str = "assignee_changed";
    pub const DETAILS_UPDATED: &str = "details_updated";
    pub const TENDER_ATTACHED: &str = "tender_attached";
    pub const ENTITY_ATTACHED: &str = "entity_attached";
    pub const EVIDENCE_ADDED: &str = "evidence_added";
    pub const NOTE_ADDED: &str = "note_added";
    pub const TIP_LINKED: &str = "tip_linked";
    pub const TIP_UNLINKED: &str = "tip_unlinked";
}

// =============================================================================
// CASE
// =============================================================================

/// An investigation case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub title: String,
    pub description: String,
    pub status: CaseStatus,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub tenders: Vec<TenderLink>,
    pub entities: Vec<EntityLink>,
    pub evidence: Vec<Evidence>,
    pub notes: Vec<Note>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented by every applied mutation.
    pub version: u64,
}

/// Input for [`Case::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCase {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub tenders: Vec<TenderLink>,
    #[serde(default)]
    pub entities: Vec<EntityLink>,
}

impl NewCase {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Input for adding evidence to a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvidence {
    pub evidence_type: EvidenceType,
    pub source_module: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A field-level update of a case.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseMutation {
    SetStatus(CaseStatus),
    /// `closed | archived -> open`.
    Reopen,
    SetPriority(Priority),
    /// `None` (or a blank name) unassigns.
    Assign(Option<String>),
    UpdateDetails {
        title: Option<String>,
        description: Option<String>,
    },
    AttachTender(TenderLink),
    AttachEntity(EntityLink),
    AddEvidence(NewEvidence),
    AddNote {
        content: String,
        author: Option<String>,
    },
}

impl CaseMutation {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetStatus(_) => "set_status",
            Self::Reopen => "reopen",
            Self::SetPriority(_) => "set_priority",
            Self::Assign(_) => "assign",
            Self::UpdateDetails { .. } => "update_details",
            Self::AttachTender(_) => "attach_tender",
            Self::AttachEntity(_) => "attach_entity",
            Self::AddEvidence(_) => "add_evidence",
            Self::AddNote { .. } => "add_note",
        }
    }
}

/// A sub-record created by a mutation, to be written with the case.
#[derive(Debug, Clone, PartialEq)]
pub enum Appended {
    Evidence(Evidence),
    Note(Note),
}

/// Everything a store must persist for one applied mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub entry: TimelineEntry,
    pub appended: Option<Appended>,
}

/// Result of [`Case::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum CaseChange {
    /// The mutation restated the current state; nothing to write.
    Unchanged,
    Applied(AppliedChange),
}

/// A validated mutation, ready to be applied without further checks.
enum Plan {
    Status(CaseStatus),
    Priority(Priority),
    Assignee(Option<String>),
    Details(Option<String>, Option<String>),
    Tender(TenderLink),
    Entity(EntityLink),
    Evidence(NewEvidence),
    Note(String, Option<String>),
}

impl Case {
    /// Validate `draft` and build the case together with its `case_created` entry.
    pub fn create(
        draft: NewCase,
        actor: Option<&str>,
        ids: &mut IdSequence,
        at: DateTime<Utc>,
    ) -> Result<(Self, TimelineEntry), EngineError> {
        let title = validate::label("title", &draft.title)?;
        let description = validate::text("description", &draft.description, false)?;
        let assigned_to = validate::optional_label("assigned_to", draft.assigned_to.as_deref())?;
        let actor = validate::optional_label("actor", actor)?;

        let mut tenders: Vec<TenderLink> = Vec::new();
        for link in draft.tenders {
            let link = validate_tender(link)?;
            if !tenders.iter().any(|t| t.tender_id == link.tender_id) {
                tenders.push(link);
            }
        }
        let mut entities: Vec<EntityLink> = Vec::new();
        for link in draft.entities {
            let link = validate_entity(link)?;
            if !entities.iter().any(|e| e.entity_id == link.entity_id) {
                entities.push(link);
            }
        }

        let id = ids.case();
        let case = Self {
            id,
            title,
            description,
            status: CaseStatus::Open,
            priority: draft.priority.unwrap_or(Priority::Medium),
            assigned_to,
            tenders,
            entities,
            evidence: Vec::new(),
            notes: Vec::new(),
            created_by: actor.clone(),
            created_at: at,
            updated_at: at,
            version: 1,
        };
        let entry = TimelineEntry {
            id: ids.timeline(),
            case_id: id,
            action: action::CASE_CREATED.to_string(),
            actor,
            details: Some(format!("Case '{}' created", case.title)),
            created_at: at,
        };
        Ok((case, entry))
    }

    /// Reject the call when the caller saw a different version.
    pub fn check_version(&self, expected: Option<u64>) -> Result<(), EngineError> {
        match expected {
            Some(expected) if expected != self.version => Err(EngineError::ConcurrentModification {
                case: self.id,
                expected,
                actual: self.version,
            }),
            _ => Ok(()),
        }
    }

    /// Whether a tender with this id is attached.
    #[must_use]
    pub fn has_tender(&self, tender_id: &str) -> bool {
        self.tenders.iter().any(|t| t.tender_id == tender_id.trim())
    }

    /// Whether an entity with this id is attached.
    #[must_use]
    pub fn has_entity(&self, entity_id: &str) -> bool {
        self.entities.iter().any(|e| e.entity_id == entity_id.trim())
    }

    /// Validate and apply one mutation.
    ///
    /// On `Err` or `Unchanged` the case is untouched and no identifier is
    /// drawn from `ids`.
    pub fn apply(
        &mut self,
        mutation: CaseMutation,
        actor: Option<&str>,
        ids: &mut IdSequence,
        at: DateTime<Utc>,
    ) -> Result<CaseChange, EngineError> {
        let actor = validate::optional_label("actor", actor)?;
        let Some(plan) = self.plan(mutation)? else {
            return Ok(CaseChange::Unchanged);
        };

        let change = match plan {
            Plan::Status(next) => {
                let reopened = self.status.is_terminal() && next == CaseStatus::Open;
                let details = format!("{} -> {}", self.status, next);
                self.status = next;
                let name = if reopened {
                    action::CASE_REOPENED
                } else {
                    action::STATUS_CHANGED
                };
                self.record(name, Some(details), actor, None, ids, at)
            }
            Plan::Priority(next) => {
                let details = format!("{} -> {}", self.priority, next);
                self.priority = next;
                self.record(action::PRIORITY_CHANGED, Some(details), actor, None, ids, at)
            }
            Plan::Assignee(next) => {
                let details = format!(
                    "{} -> {}",
                    self.assigned_to.as_deref().unwrap_or("unassigned"),
                    next.as_deref().unwrap_or("unassigned")
                );
                self.assigned_to = next;
                self.record(action::ASSIGNEE_CHANGED, Some(details), actor, None, ids, at)
            }
            Plan::Details(title, description) => {
                let mut changed = Vec::new();
                if let Some(title) = title {
                    self.title = title;
                    changed.push("title");
                }
                if let Some(description) = description {
                    self.description = description;
                    changed.push("description");
                }
                let details = format!("Updated {}", changed.join(" and "));
                self.record(action::DETAILS_UPDATED, Some(details), actor, None, ids, at)
            }
            Plan::Tender(link) => {
                let details = describe_role(&link.tender_id, link.role.as_deref());
                self.tenders.push(link);
                self.record(action::TENDER_ATTACHED, Some(details), actor, None, ids, at)
            }
            Plan::Entity(link) => {
                let details = format!(
                    "{} ({})",
                    describe_role(&link.entity_name, link.role.as_deref()),
                    link.entity_type
                );
                self.entities.push(link);
                self.record(action::ENTITY_ATTACHED, Some(details), actor, None, ids, at)
            }
            Plan::Evidence(draft) => {
                let evidence = Evidence {
                    id: ids.evidence(),
                    evidence_type: draft.evidence_type,
                    source_module: draft.source_module,
                    title: draft.title,
                    description: draft.description,
                    severity: draft.severity,
                    metadata: draft.metadata,
                    created_at: at,
                };
                let details = format!("{}: {}", evidence.evidence_type, evidence.title);
                self.evidence.push(evidence.clone());
                self.record(
                    action::EVIDENCE_ADDED,
                    Some(details),
                    actor,
                    Some(Appended::Evidence(evidence)),
                    ids,
                    at,
                )
            }
            Plan::Note(content, author) => {
                let note = Note {
                    id: ids.note(),
                    content,
                    author: author.or_else(|| actor.clone()),
                    created_at: at,
                };
                let details = format!("Note #{} added", note.id.0);
                self.notes.push(note.clone());
                self.record(
                    action::NOTE_ADDED,
                    Some(details),
                    actor,
                    Some(Appended::Note(note)),
                    ids,
                    at,
                )
            }
        };
        Ok(CaseChange::Applied(change))
    }

    /// Check a mutation against the current state. `None` means no-op.
    fn plan(&self, mutation: CaseMutation) -> Result<Option<Plan>, EngineError> {
        let plan = match mutation {
            CaseMutation::SetStatus(next) => {
                if !self.status.can_transition_to(next) {
                    return Err(EngineError::transition(self.status, next));
                }
                Plan::Status(next)
            }
            CaseMutation::Reopen => {
                if !self.status.is_terminal() {
                    return Err(EngineError::transition(self.status, CaseStatus::Open));
                }
                Plan::Status(CaseStatus::Open)
            }
            CaseMutation::SetPriority(next) => {
                if next == self.priority {
                    return Ok(None);
                }
                Plan::Priority(next)
            }
            CaseMutation::Assign(next) => {
                let next = validate::optional_label("assigned_to", next.as_deref())?;
                if next == self.assigned_to {
                    return Ok(None);
                }
                Plan::Assignee(next)
            }
            CaseMutation::UpdateDetails { title, description } => {
                if title.is_none() && description.is_none() {
                    return Err(EngineError::InvalidInput(
                        "update must change the title or the description".to_string(),
                    ));
                }
                let title = title
                    .map(|t| validate::label("title", &t))
                    .transpose()?
                    .filter(|t| *t != self.title);
                let description = description
                    .map(|d| validate::text("description", &d, false))
                    .transpose()?
                    .filter(|d| *d != self.description);
                if title.is_none() && description.is_none() {
                    return Ok(None);
                }
                Plan::Details(title, description)
            }
            CaseMutation::AttachTender(link) => {
                let link = validate_tender(link)?;
                if self.has_tender(&link.tender_id) {
                    return Ok(None);
                }
                Plan::Tender(link)
            }
            CaseMutation::AttachEntity(link) => {
                let link = validate_entity(link)?;
                if self.has_entity(&link.entity_id) {
                    return Ok(None);
                }
                Plan::Entity(link)
            }
            CaseMutation::AddEvidence(draft) => Plan::Evidence(validate_evidence(draft)?),
            CaseMutation::AddNote { content, author } => Plan::Note(
                validate::text("content", &content, true)?,
                validate::optional_label("author", author.as_deref())?,
            ),
        };
        Ok(Some(plan))
    }

    /// Append evidence produced outside the analyst workflow (e.g. a linked
    /// tip) under a dedicated timeline action.
    pub(crate) fn append_evidence(
        &mut self,
        draft: NewEvidence,
        action_name: &str,
        details: String,
        actor: Option<String>,
        ids: &mut IdSequence,
        at: DateTime<Utc>,
    ) -> Result<AppliedChange, EngineError> {
        let draft = validate_evidence(draft)?;
        let evidence = Evidence {
            id: ids.evidence(),
            evidence_type: draft.evidence_type,
            source_module: draft.source_module,
            title: draft.title,
            description: draft.description,
            severity: draft.severity,
            metadata: draft.metadata,
            created_at: at,
        };
        self.evidence.push(evidence.clone());
        Ok(self.record(
            action_name,
            Some(details),
            actor,
            Some(Appended::Evidence(evidence)),
            ids,
            at,
        ))
    }

    /// Append a timeline entry with no other change.
    pub(crate) fn annotate(
        &mut self,
        action_name: &str,
        details: String,
        actor: Option<String>,
        ids: &mut IdSequence,
        at: DateTime<Utc>,
    ) -> AppliedChange {
        self.record(action_name, Some(details), actor, None, ids, at)
    }

    fn record(
        &mut self,
        action_name: &str,
        details: Option<String>,
        actor: Option<String>,
        appended: Option<Appended>,
        ids: &mut IdSequence,
        at: DateTime<Utc>,
    ) -> AppliedChange {
        self.version = self.version.saturating_add(1);
        self.updated_at = at;
        AppliedChange {
            entry: TimelineEntry {
                id: ids.timeline(),
                case_id: self.id,
                action: action_name.to_string(),
                actor,
                details,
                created_at: at,
            },
            appended,
        }
    }
}

fn describe_role(name: &str, role: Option<&str>) -> String {
    match role {
        Some(role) => format!("{name} as {role}"),
        None => name.to_string(),
    }
}

fn validate_tender(link: TenderLink) -> Result<TenderLink, EngineError> {
    Ok(TenderLink {
        tender_id: validate::label("tender_id", &link.tender_id)?,
        role: validate::optional_label("role", link.role.as_deref())?,
    })
}

fn validate_entity(link: EntityLink) -> Result<EntityLink, EngineError> {
    Ok(EntityLink {
        entity_id: validate::label("entity_id", &link.entity_id)?,
        entity_type: validate::label("entity_type", &link.entity_type)?,
        entity_name: validate::label("entity_name", &link.entity_name)?,
        role: validate::optional_label("role", link.role.as_deref())?,
    })
}

fn validate_evidence(draft: NewEvidence) -> Result<NewEvidence, EngineError> {
    Ok(NewEvidence {
        evidence_type: draft.evidence_type,
        source_module: validate::label("source_module", &draft.source_module)?,
        title: validate::label("title", &draft.title)?,
        description: validate::text("description", &draft.description, false)?,
        severity: draft.severity,
        metadata: draft.metadata,
    })
}

// =============================================================================
// FILTER
// =============================================================================

/// Listing filter for cases. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFilter {
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CaseFilter {
    #[must_use]
    pub fn matches(&self, case: &Case) -> bool {
        self.status.is_none_or(|s| s == case.status)
            && self.priority.is_none_or(|p| p == case.priority)
            && self
                .assigned_to
                .as_deref()
                .is_none_or(|a| case.assigned_to.as_deref() == Some(a))
    }

    /// Effective row cap, bounded by `MAX_LIST_LIMIT`.
    #[must_use]
    pub fn cap(&self) -> usize {
        crate::primitives::capped_limit(self.limit)
    }
}

// =============================================================================
// TESTS
// =============================================================================

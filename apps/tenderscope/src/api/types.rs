//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Records (cases, tips, timeline entries, investigation results) are
//! returned as defined in `tenderscope-core`; only request envelopes and a
//! few responses live here.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tenderscope_core::{
    Case, CaseId, CaseMutation, CaseStatus, EngineError, EntityLink, EvidenceType,
    InvestigationQuery, Metadata, NewCase, NewEvidence, Priority, Severity, Source, TenderLink,
    TimelineEntry, Tip,
};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Engine status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub cases: usize,
    pub tips: usize,
    pub persistent: bool,
    pub sources: Vec<Source>,
    pub cached_investigations: usize,
    pub cache_ttl_secs: u64,
    pub deadline_ms: u64,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    pub retryable: bool,
}

impl From<&EngineError> for ErrorResponse {
    fn from(e: &EngineError) -> Self {
        Self {
            error: e.to_string(),
            kind: e.kind().to_string(),
            retryable: e.is_retryable(),
        }
    }
}

// =============================================================================
// INVESTIGATIONS
// =============================================================================

/// Request to investigate a subject.
#[derive(Debug, Clone, Deserialize)]
pub struct InvestigateRequest {
    #[serde(flatten)]
    pub query: InvestigationQuery,
    /// Tighter deadline for this request, in milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl InvestigateRequest {
    /// The request's deadline. It may shorten the server's deadline but
    /// never extend it.
    pub fn deadline(&self, configured: Duration) -> Result<Option<Duration>, EngineError> {
        match self.deadline_ms {
            None => Ok(None),
            Some(0) => Err(EngineError::InvalidQuery(
                "deadline_ms must be positive".to_string(),
            )),
            Some(ms) => Ok(Some(Duration::from_millis(ms).min(configured))),
        }
    }
}

/// Response of a cache invalidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub invalidated: bool,
}

// =============================================================================
// CASES
// =============================================================================

/// Case creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCaseRequest {
    #[serde(flatten)]
    pub case: NewCase,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Field updates of a case. Absent fields are left alone.
///
/// `assigned_to: null` unassigns the case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCaseRequest {
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<String>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl UpdateCaseRequest {
    /// The mutations this request asks for, in application order.
    ///
    /// Details come first and the status last, so a status change is
    /// recorded after the edits it concludes.
    pub fn mutations(&self) -> Result<Vec<CaseMutation>, EngineError> {
        let mut mutations = Vec::new();
        if self.title.is_some() || self.description.is_some() {
            mutations.push(CaseMutation::UpdateDetails {
                title: self.title.clone(),
                description: self.description.clone(),
            });
        }
        if let Some(priority) = self.priority {
            mutations.push(CaseMutation::SetPriority(priority));
        }
        if let Some(assignee) = &self.assigned_to {
            mutations.push(CaseMutation::Assign(assignee.clone()));
        }
        if let Some(status) = self.status {
            mutations.push(CaseMutation::SetStatus(status));
        }
        if mutations.is_empty() {
            return Err(EngineError::InvalidInput("update contains no changes".to_string()));
        }
        Ok(mutations)
    }
}

/// Who is acting, and on which version of the case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorRequest {
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// Tender attachment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachTenderRequest {
    #[serde(flatten)]
    pub tender: TenderLink,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// Entity attachment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachEntityRequest {
    #[serde(flatten)]
    pub entity: EntityLink,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// Evidence request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEvidenceRequest {
    pub evidence_type: EvidenceType,
    pub source_module: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl AddEvidenceRequest {
    #[must_use]
    pub fn to_evidence(&self) -> NewEvidence {
        NewEvidence {
            evidence_type: self.evidence_type,
            source_module: self.source_module.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            severity: self.severity,
            metadata: self.metadata.clone(),
        }
    }
}

/// Note request. The author is also the actor of the timeline entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNoteRequest {
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// A case after one or more mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseChangeResponse {
    pub case: Case,
    /// Timeline entries appended by the request; empty for a no-op.
    pub entries: Vec<TimelineEntry>,
}

// =============================================================================
// TIPS
// =============================================================================

/// Link request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTipRequest {
    pub case_id: CaseId,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Result of linking or unlinking a tip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipLinkResponse {
    pub tip: Tip,
    pub case: Case,
    pub entry: TimelineEntry,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_null_unassigns() {
        let request: UpdateCaseRequest =
            serde_json::from_str(r#"{"assigned_to": null}"#).expect("parse");
        assert_eq!(request.assigned_to, Some(None));
        assert_eq!(
            request.mutations().expect("mutations"),
            vec![CaseMutation::Assign(None)]
        );

        let request: UpdateCaseRequest = serde_json::from_str(r#"{"priority": "high"}"#).expect("parse");
        assert_eq!(request.assigned_to, None);
    }

    #[test]
    fn status_is_applied_last() {
        let request: UpdateCaseRequest =
            serde_json::from_str(r#"{"status": "in_progress", "title": "Renamed", "priority": "low"}"#)
                .expect("parse");
        let names: Vec<&str> = request
            .mutations()
            .expect("mutations")
            .iter()
            .map(CaseMutation::name)
            .collect();
        assert_eq!(names, vec!["update_details", "set_priority", "set_status"]);
    }

    #[test]
    fn empty_update_is_invalid() {
        let err = UpdateCaseRequest::default()
            .mutations()
            .expect_err("no changes");
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn create_request_flattens_case_fields() {
        let request: CreateCaseRequest = serde_json::from_str(
            r#"{"title": "Fuel depot", "priority": "critical", "tenders": [{"tender_id": "UA-1"}], "actor": "ana"}"#,
        )
        .expect("parse");
        assert_eq!(request.case.title, "Fuel depot");
        assert_eq!(request.case.priority, Some(Priority::Critical));
        assert_eq!(request.case.tenders.len(), 1);
        assert_eq!(request.actor.as_deref(), Some("ana"));
    }

    #[test]
    fn request_deadline_only_tightens() {
        let configured = Duration::from_secs(20);
        let request: InvestigateRequest = serde_json::from_str(
            r#"{"subject_type": "tender", "subject_key": "UA-1", "deadline_ms": 1500}"#,
        )
        .expect("parse");
        assert_eq!(request.query.subject_key, "UA-1");
        assert_eq!(
            request.deadline(configured).expect("deadline"),
            Some(Duration::from_millis(1500))
        );

        let request: InvestigateRequest = serde_json::from_str(
            r#"{"subject_type": "tender", "subject_key": "UA-1", "deadline_ms": 60000}"#,
        )
        .expect("parse");
        assert_eq!(request.deadline(configured).expect("deadline"), Some(configured));

        let request: InvestigateRequest =
            serde_json::from_str(r#"{"subject_type": "tender", "subject_key": "UA-1", "deadline_ms": 0}"#)
                .expect("parse");
        assert_eq!(request.deadline(configured).expect_err("zero").kind(), "invalid_query");
    }

    #[test]
    fn error_body_carries_kind_and_retryability() {
        let body = ErrorResponse::from(&EngineError::ConcurrentModification {
            case: CaseId(3),
            expected: 1,
            actual: 2,
        });
        assert_eq!(body.kind, "concurrent_modification");
        assert!(body.retryable);
    }
}

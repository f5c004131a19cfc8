//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Every handler returns either JSON or an [`ApiError`], which maps the
//! engine error class to a status code:
//!
//! | Error | Status |
//! |-------|--------|
//! | `case_not_found`, `tip_not_found` | 404 |
//! | `invalid_query`, `invalid_input` | 400 |
//! | `invalid_transition`, `concurrent_modification` | 409 |
//! | `source_unavailable` | 503 |
//! | `storage`, `serialization` | 500 |

use super::{
    AppState,
    types::{
        ActorRequest, AddEvidenceRequest, AddNoteRequest, AttachEntityRequest,
        AttachTenderRequest, CaseChangeResponse, CreateCaseRequest, ErrorResponse, HealthResponse,
        InvalidateResponse, InvestigateRequest, LinkTipRequest, StatusResponse, TipLinkResponse,
        UpdateCaseRequest,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tenderscope_core::{
    Case, CaseFilter, CaseId, CaseMutation, EngineError, InvestigationQuery, InvestigationResult,
    LinkOutcome, MutationOutcome, TimelineEntry, Tip, TipFilter, TipId, TipPatch, TipSubmission,
};

// =============================================================================
// ERRORS
// =============================================================================

/// An engine error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

/// HTTP status for an engine error.
#[must_use]
pub fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::CaseNotFound(_) | EngineError::TipNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidQuery(_) | EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::InvalidTransition { .. } | EngineError::ConcurrentModification { .. } => {
            StatusCode::CONFLICT
        }
        EngineError::SourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Storage(_) | EngineError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(kind = self.0.kind(), error = %self.0, "Request rejected");
        }
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn change_response(outcome: MutationOutcome) -> Json<CaseChangeResponse> {
    Json(CaseChangeResponse {
        case: outcome.case,
        entries: outcome.entry.into_iter().collect(),
    })
}

fn link_response(outcome: LinkOutcome) -> Json<TipLinkResponse> {
    Json(TipLinkResponse {
        tip: outcome.tip,
        case: outcome.case,
        entry: outcome.entry,
    })
}

/// Apply one mutation under the write lock.
async fn mutate(
    state: &AppState,
    id: u64,
    mutation: CaseMutation,
    actor: Option<&str>,
    expected_version: Option<u64>,
) -> ApiResult<CaseChangeResponse> {
    let name = mutation.name();
    let mut ledger = state.ledger.write().await;
    let outcome = ledger.mutate_case(CaseId(id), mutation, actor, expected_version)?;
    tracing::info!(
        case_id = id,
        mutation = name,
        applied = outcome.entry.is_some(),
        version = outcome.case.version,
        "Case mutated"
    );
    Ok(change_response(outcome))
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Record counts, registered sources and cache state.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let stats = state.ledger.read().await.stats()?;
    let orchestrator = &state.orchestrator;
    Ok(Json(StatusResponse {
        cases: stats.cases,
        tips: stats.tips,
        persistent: stats.persistent,
        sources: orchestrator.sources(),
        cached_investigations: orchestrator.cache().len().await,
        cache_ttl_secs: orchestrator.cache().ttl().as_secs(),
        deadline_ms: orchestrator.deadline().as_millis() as u64,
    }))
}

// =============================================================================
// INVESTIGATIONS
// =============================================================================

/// Investigate a subject (possibly served from the cache).
pub async fn investigate_handler(
    State(state): State<AppState>,
    Json(request): Json<InvestigateRequest>,
) -> ApiResult<InvestigationResult> {
    let deadline = request.deadline(state.orchestrator.deadline())?;
    let result = state
        .orchestrator
        .investigate_with_progress(request.query, deadline, None)
        .await?;
    Ok(Json(result))
}

/// Drop the cached investigation of a subject.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path((subject_type, subject_key)): Path<(String, String)>,
) -> ApiResult<InvalidateResponse> {
    let query = InvestigationQuery::parse(&subject_type, &subject_key)?;
    let invalidated = state.orchestrator.invalidate(&query).await;
    tracing::info!(subject = %query, invalidated, "Investigation cache invalidated");
    Ok(Json(InvalidateResponse { invalidated }))
}

// =============================================================================
// CASES
// =============================================================================

pub async fn list_cases_handler(
    State(state): State<AppState>,
    Query(filter): Query<CaseFilter>,
) -> ApiResult<Vec<Case>> {
    let cases = state.ledger.read().await.cases(&filter)?;
    Ok(Json(cases))
}

pub async fn create_case_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateCaseRequest>,
) -> Result<(StatusCode, Json<Case>), ApiError> {
    let case = state
        .ledger
        .write()
        .await
        .create_case(request.case, request.actor.as_deref())?;
    tracing::info!(case_id = case.id.0, "Case created");
    Ok((StatusCode::CREATED, Json(case)))
}

pub async fn get_case_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Case> {
    let case = state.ledger.read().await.case(CaseId(id))?;
    Ok(Json(case))
}

/// Status, priority, assignee and details in one request.
///
/// The changes commit together or not at all.
pub async fn update_case_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateCaseRequest>,
) -> ApiResult<CaseChangeResponse> {
    let mutations = request.mutations()?;
    let count = mutations.len();
    let mut ledger = state.ledger.write().await;
    let (case, entries) = ledger.mutate_case_all(
        CaseId(id),
        mutations,
        request.actor.as_deref(),
        request.expected_version,
    )?;
    tracing::info!(
        case_id = id,
        requested = count,
        applied = entries.len(),
        version = case.version,
        "Case updated"
    );
    Ok(Json(CaseChangeResponse { case, entries }))
}

pub async fn reopen_case_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ActorRequest>,
) -> ApiResult<CaseChangeResponse> {
    mutate(
        &state,
        id,
        CaseMutation::Reopen,
        request.actor.as_deref(),
        request.expected_version,
    )
    .await
}

pub async fn attach_tender_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<AttachTenderRequest>,
) -> ApiResult<CaseChangeResponse> {
    mutate(
        &state,
        id,
        CaseMutation::AttachTender(request.tender),
        request.actor.as_deref(),
        request.expected_version,
    )
    .await
}

pub async fn attach_entity_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<AttachEntityRequest>,
) -> ApiResult<CaseChangeResponse> {
    mutate(
        &state,
        id,
        CaseMutation::AttachEntity(request.entity),
        request.actor.as_deref(),
        request.expected_version,
    )
    .await
}

pub async fn add_evidence_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<AddEvidenceRequest>,
) -> ApiResult<CaseChangeResponse> {
    mutate(
        &state,
        id,
        CaseMutation::AddEvidence(request.to_evidence()),
        request.actor.as_deref(),
        request.expected_version,
    )
    .await
}

pub async fn add_note_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<AddNoteRequest>,
) -> ApiResult<CaseChangeResponse> {
    let author = request.author.clone();
    mutate(
        &state,
        id,
        CaseMutation::AddNote {
            content: request.content,
            author: request.author,
        },
        author.as_deref(),
        request.expected_version,
    )
    .await
}

pub async fn timeline_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<TimelineEntry>> {
    let entries = state.ledger.read().await.timeline(CaseId(id))?;
    Ok(Json(entries))
}

// =============================================================================
// TIPS
// =============================================================================

pub async fn list_tips_handler(
    State(state): State<AppState>,
    Query(filter): Query<TipFilter>,
) -> ApiResult<Vec<Tip>> {
    let tips = state.ledger.read().await.tips(&filter)?;
    Ok(Json(tips))
}

/// Anonymous intake. Triage runs before the tip is stored.
pub async fn submit_tip_handler(
    State(state): State<AppState>,
    Json(submission): Json<TipSubmission>,
) -> Result<(StatusCode, Json<Tip>), ApiError> {
    let tip = state
        .ledger
        .write()
        .await
        .submit_tip(submission, state.triage.as_ref())?;
    tracing::info!(
        tip_id = tip.id.0,
        category = %tip.category,
        urgency = %tip.urgency,
        "Tip submitted"
    );
    Ok((StatusCode::CREATED, Json(tip)))
}

pub async fn get_tip_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Tip> {
    let tip = state.ledger.read().await.tip(TipId(id))?;
    Ok(Json(tip))
}

pub async fn patch_tip_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<TipPatch>,
) -> ApiResult<Tip> {
    let tip = state.ledger.write().await.patch_tip(TipId(id), patch)?;
    tracing::info!(tip_id = id, status = %tip.status, "Tip updated");
    Ok(Json(tip))
}

pub async fn link_tip_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<LinkTipRequest>,
) -> ApiResult<TipLinkResponse> {
    let outcome = state
        .ledger
        .write()
        .await
        .link_tip(TipId(id), request.case_id, request.actor.as_deref())?;
    tracing::info!(tip_id = id, case_id = request.case_id.0, "Tip linked");
    Ok(link_response(outcome))
}

pub async fn unlink_tip_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ActorRequest>,
) -> ApiResult<TipLinkResponse> {
    let outcome = state
        .ledger
        .write()
        .await
        .unlink_tip(TipId(id), request.actor.as_deref())?;
    tracing::info!(tip_id = id, case_id = outcome.case.id.0, "Tip unlinked");
    Ok(link_response(outcome))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tenderscope_core::Source;

    #[test]
    fn error_classes_map_to_status_codes() {
        assert_eq!(status_for(&EngineError::CaseNotFound(CaseId(1))), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&EngineError::TipNotFound(TipId(1))), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&EngineError::InvalidQuery("empty".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&EngineError::InvalidTransition {
                from: "open".to_string(),
                to: "closed".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&EngineError::SourceUnavailable {
                origin: Source::Web,
                reason: "down".to_string()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&EngineError::Storage("disk".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

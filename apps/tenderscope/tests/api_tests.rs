//! Integration tests for the Tenderscope HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::HeaderValue;
use axum_test::TestServer;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tenderscope::api::{
    AppState, CaseChangeResponse, ErrorResponse, HealthResponse, InvalidateResponse,
    StatusResponse, TipLinkResponse, create_router,
};
use tenderscope::config::OrchestratorConfig;
use tenderscope::investigation::{Orchestrator, StaticInvestigator};
use tenderscope_core::{
    Case, CaseStatus, Finding, HeuristicTriage, InvestigationResult, Ledger, RiskScorer,
    ScoringConfig, Severity, Source, TimelineEntry, Tip, TipStatus,
};

/// Mutex to serialize tests since auth tests modify env vars.
static AUTH_TEST_MUTEX: Mutex<()> = Mutex::new(());

const API_KEY_VAR: &str = "TENDERSCOPE_API_KEY";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var(API_KEY_VAR) };
    }
}

/// Two sources that both report a single-bidder tender.
fn fixture_orchestrator() -> Orchestrator {
    let scorer = RiskScorer::new(ScoringConfig::default()).unwrap();
    let mut orchestrator = Orchestrator::new(scorer, OrchestratorConfig::default());
    let finding = Finding::new(
        Source::History,
        "single_bidder",
        "Only one bid was received",
        Severity::High,
    );
    orchestrator
        .register(Arc::new(StaticInvestigator::new(Source::History, vec![finding.clone()])))
        .unwrap();
    orchestrator
        .register(Arc::new(StaticInvestigator::new(Source::Registry, vec![finding])))
        .unwrap();
    orchestrator
}

fn build_server(api_key: Option<&str>) -> (TestServer, TestGuard) {
    let guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe {
        match api_key {
            Some(key) => std::env::set_var(API_KEY_VAR, key),
            None => std::env::remove_var(API_KEY_VAR),
        }
    };
    let state = AppState::new(
        Ledger::new(),
        fixture_orchestrator(),
        Arc::new(HeuristicTriage::default()),
    );
    (
        TestServer::new(create_router(state)).unwrap(),
        TestGuard { _guard: guard },
    )
}

/// Create a test server with an empty in-memory ledger.
/// Returns a guard that must be kept alive during the test.
fn create_test_server() -> (TestServer, TestGuard) {
    build_server(None)
}

async fn create_case(server: &TestServer, title: &str) -> Case {
    let response = server
        .post("/cases")
        .json(&json!({"title": title, "priority": "high", "actor": "olena"}))
        .await;
    assert_eq!(response.status_code().as_u16(), 201);
    response.json()
}

async fn submit_tip(server: &TestServer) -> Tip {
    let response = server
        .post("/tips")
        .json(&json!({
            "category": "bid_rigging",
            "description": "The same three companies take turns winning road repair tenders UA-2024-03-01-000042."
        }))
        .await;
    assert_eq!(response.status_code().as_u16(), 201);
    response.json()
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_reports_sources_and_counts() {
    let (server, _guard) = create_test_server();
    create_case(&server, "Road repair cartel").await;

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.cases, 1);
    assert_eq!(status.tips, 0);
    assert!(!status.persistent);
    assert_eq!(status.sources, vec![Source::History, Source::Registry]);
    assert_eq!(status.cached_investigations, 0);
}

// =============================================================================
// INVESTIGATIONS
// =============================================================================

#[tokio::test]
async fn test_investigation_is_cached() {
    let (server, _guard) = create_test_server();
    let body = json!({"subject_type": "tender", "subject_key": "UA-2024-03-01-000042"});

    let first: InvestigationResult = server.post("/investigations").json(&body).await.json();
    assert!(!first.cached);
    assert_eq!(first.findings.len(), 2);
    assert!(first.findings.iter().all(|f| f.corroborated));
    assert_eq!(first.sources_checked.get(&Source::History), Some(&true));

    let second: InvestigationResult = server.post("/investigations").json(&body).await.json();
    assert!(second.cached);
    assert_eq!(second.risk_score, first.risk_score);

    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.cached_investigations, 1);
}

#[tokio::test]
async fn test_invalidate_drops_cached_result() {
    let (server, _guard) = create_test_server();
    let body = json!({"subject_type": "company", "subject_key": "Acme Build LLC"});
    server.post("/investigations").json(&body).await.assert_status_ok();

    let response = server.delete("/investigations/company/Acme%20Build%20LLC").await;
    response.assert_status_ok();
    let invalidated: InvalidateResponse = response.json();
    assert!(invalidated.invalidated);

    let again: InvestigationResult = server.post("/investigations").json(&body).await.json();
    assert!(!again.cached);
}

#[tokio::test]
async fn test_blank_subject_is_bad_request() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/investigations")
        .json(&json!({"subject_type": "tender", "subject_key": "   "}))
        .await;

    assert_eq!(response.status_code().as_u16(), 400);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "invalid_query");
    assert!(!error.retryable);
}

#[tokio::test]
async fn test_investigation_accepts_a_request_deadline() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/investigations")
        .json(&json!({"subject_type": "tender", "subject_key": "UA-2024-03-01-000042", "deadline_ms": 500}))
        .await;
    response.assert_status_ok();
    let result: InvestigationResult = response.json();
    assert_eq!(result.findings.len(), 2);

    let response = server
        .post("/investigations")
        .json(&json!({"subject_type": "tender", "subject_key": "UA-2024-03-01-000043", "deadline_ms": 0}))
        .await;
    assert_eq!(response.status_code().as_u16(), 400);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "invalid_query");
}

// =============================================================================
// CASES
// =============================================================================

#[tokio::test]
async fn test_case_lifecycle() {
    let (server, _guard) = create_test_server();
    let case = create_case(&server, "Road repair cartel").await;
    assert_eq!(case.status, CaseStatus::Open);
    assert_eq!(case.version, 1);

    for status in ["in_progress", "review", "closed"] {
        let response = server
            .patch(&format!("/cases/{}", case.id.0))
            .json(&json!({"status": status, "actor": "olena"}))
            .await;
        response.assert_status_ok();
    }

    let response = server
        .post(&format!("/cases/{}/reopen", case.id.0))
        .json(&json!({"actor": "supervisor"}))
        .await;
    response.assert_status_ok();
    let change: CaseChangeResponse = response.json();
    assert_eq!(change.case.status, CaseStatus::Open);

    let timeline: Vec<TimelineEntry> = server
        .get(&format!("/cases/{}/timeline", case.id.0))
        .await
        .json();
    let actions: Vec<&str> = timeline.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            "case_created",
            "status_changed",
            "status_changed",
            "status_changed",
            "case_reopened"
        ]
    );
}

#[tokio::test]
async fn test_invalid_transition_is_conflict() {
    let (server, _guard) = create_test_server();
    let case = create_case(&server, "Hospital supplies").await;

    let response = server
        .patch(&format!("/cases/{}", case.id.0))
        .json(&json!({"status": "closed"}))
        .await;

    assert_eq!(response.status_code().as_u16(), 409);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "invalid_transition");

    let unchanged: Case = server.get(&format!("/cases/{}", case.id.0)).await.json();
    assert_eq!(unchanged.version, 1);
}

#[tokio::test]
async fn test_stale_version_is_retryable_conflict() {
    let (server, _guard) = create_test_server();
    let case = create_case(&server, "School meals").await;

    server
        .post(&format!("/cases/{}/notes", case.id.0))
        .json(&json!({"content": "Called the procurement office", "author": "olena"}))
        .await
        .assert_status_ok();

    let response = server
        .patch(&format!("/cases/{}", case.id.0))
        .json(&json!({"priority": "critical", "expected_version": 1}))
        .await;

    assert_eq!(response.status_code().as_u16(), 409);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "concurrent_modification");
    assert!(error.retryable);
}

#[tokio::test]
async fn test_multi_field_update_is_all_or_nothing() {
    let (server, _guard) = create_test_server();
    let case = create_case(&server, "Bridge design").await;

    let rejected = server
        .patch(&format!("/cases/{}", case.id.0))
        .json(&json!({"priority": "low", "status": "review"}))
        .await;
    assert_eq!(rejected.status_code().as_u16(), 409);
    let unchanged: Case = server.get(&format!("/cases/{}", case.id.0)).await.json();
    assert_eq!(unchanged.priority, case.priority);

    let accepted = server
        .patch(&format!("/cases/{}", case.id.0))
        .json(&json!({"priority": "low", "assigned_to": "taras", "status": "in_progress"}))
        .await;
    accepted.assert_status_ok();
    let change: CaseChangeResponse = accepted.json();
    assert_eq!(change.entries.len(), 3);
    assert_eq!(change.case.assigned_to.as_deref(), Some("taras"));
    assert_eq!(change.case.status, CaseStatus::InProgress);
}

#[tokio::test]
async fn test_empty_update_is_bad_request() {
    let (server, _guard) = create_test_server();
    let case = create_case(&server, "Bridge design").await;

    let response = server
        .patch(&format!("/cases/{}", case.id.0))
        .json(&json!({"actor": "olena"}))
        .await;

    assert_eq!(response.status_code().as_u16(), 400);
}

#[tokio::test]
async fn test_attach_tender_twice_adds_one_link() {
    let (server, _guard) = create_test_server();
    let case = create_case(&server, "Road repair cartel").await;
    let path = format!("/cases/{}/tenders", case.id.0);

    for _ in 0..2 {
        server
            .post(&path)
            .json(&json!({"tender_id": "UA-2024-03-01-000042", "role": "suspect"}))
            .await
            .assert_status_ok();
    }

    let case: Case = server.get(&format!("/cases/{}", case.id.0)).await.json();
    assert_eq!(case.tenders.len(), 1);
}

#[tokio::test]
async fn test_list_cases_filters_by_status() {
    let (server, _guard) = create_test_server();
    let first = create_case(&server, "Road repair cartel").await;
    create_case(&server, "Hospital supplies").await;
    server
        .patch(&format!("/cases/{}", first.id.0))
        .json(&json!({"status": "in_progress"}))
        .await
        .assert_status_ok();

    let open: Vec<Case> = server
        .get("/cases")
        .add_query_param("status", "open")
        .await
        .json();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].title, "Hospital supplies");

    let all: Vec<Case> = server.get("/cases").await.json();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_missing_case_is_not_found() {
    let (server, _guard) = create_test_server();

    let response = server.get("/cases/999").await;

    assert_eq!(response.status_code().as_u16(), 404);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "case_not_found");
}

// =============================================================================
// TIPS
// =============================================================================

#[tokio::test]
async fn test_tip_intake_triage_and_link() {
    let (server, _guard) = create_test_server();
    let case = create_case(&server, "Road repair cartel").await;
    let tip = submit_tip(&server).await;
    assert_eq!(tip.status, TipStatus::Submitted);
    assert!(tip.triage_score.is_some());

    // A submitted tip has not been reviewed yet and cannot be linked.
    let early = server
        .post(&format!("/tips/{}/link", tip.id.0))
        .json(&json!({"case_id": case.id.0}))
        .await;
    assert_eq!(early.status_code().as_u16(), 409);

    let reviewed: Tip = server
        .patch(&format!("/tips/{}", tip.id.0))
        .json(&json!({"status": "under_review", "analyst_note": "credible"}))
        .await
        .json();
    assert_eq!(reviewed.status, TipStatus::UnderReview);

    let response = server
        .post(&format!("/tips/{}/link", tip.id.0))
        .json(&json!({"case_id": case.id.0, "actor": "olena"}))
        .await;
    response.assert_status_ok();
    let link: TipLinkResponse = response.json();
    assert_eq!(link.tip.status, TipStatus::Linked);
    assert_eq!(link.tip.linked_case_id, Some(case.id));
    assert_eq!(link.case.evidence.len(), 1);
    assert_eq!(link.entry.action, "tip_linked");

    let response = server
        .post(&format!("/tips/{}/unlink", tip.id.0))
        .json(&json!({"actor": "olena"}))
        .await;
    response.assert_status_ok();
    let unlink: TipLinkResponse = response.json();
    assert_eq!(unlink.tip.status, TipStatus::Investigating);
    assert_eq!(unlink.case.evidence.len(), 1);
}

#[tokio::test]
async fn test_tip_patch_rejects_linked_status() {
    let (server, _guard) = create_test_server();
    let tip = submit_tip(&server).await;

    let response = server
        .patch(&format!("/tips/{}", tip.id.0))
        .json(&json!({"status": "linked"}))
        .await;

    assert_eq!(response.status_code().as_u16(), 409);
}

#[tokio::test]
async fn test_list_tips_filters_by_status() {
    let (server, _guard) = create_test_server();
    let first = submit_tip(&server).await;
    submit_tip(&server).await;
    server
        .patch(&format!("/tips/{}", first.id.0))
        .json(&json!({"status": "dismissed"}))
        .await
        .assert_status_ok();

    let submitted: Vec<Tip> = server
        .get("/tips")
        .add_query_param("status", "submitted")
        .await
        .json();
    assert_eq!(submitted.len(), 1);
    assert_ne!(submitted[0].id, first.id);
}

#[tokio::test]
async fn test_missing_tip_is_not_found() {
    let (server, _guard) = create_test_server();

    let response = server.get("/tips/42").await;

    assert_eq!(response.status_code().as_u16(), 404);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "tip_not_found");
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let api_key = "test-secret-key-12345";
    let (server, _guard) = build_server(Some(api_key));

    let response = server
        .get("/status")
        .add_header(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", api_key)
                .parse::<HeaderValue>()
                .unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let (server, _guard) = build_server(Some("correct-key"));

    let response = server
        .get("/cases")
        .add_header(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await;

    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_required_for_tip_intake() {
    let (server, _guard) = build_server(Some("required-key"));

    let response = server
        .post("/tips")
        .json(&json!({"category": "fraud", "description": "Inflated invoices for school meals"}))
        .await;

    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_health_bypasses_auth() {
    let (server, _guard) = build_server(Some("secret-key-for-bypass-test"));

    let response = server.get("/health").await;

    response.assert_status_ok();
}

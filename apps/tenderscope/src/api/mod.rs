//! # Tenderscope HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Record counts, sources and cache state
//! - `POST /investigations` - Investigate a tender, company or institution
//! - `DELETE /investigations/{subject_type}/{subject_key}` - Drop a cached result
//! - `GET|POST /cases` - List / create cases
//! - `GET|PATCH /cases/{id}` - Read / update a case
//! - `POST /cases/{id}/reopen` - Reopen a closed or archived case
//! - `POST /cases/{id}/tenders|entities|evidence|notes` - Sub-resources
//! - `GET /cases/{id}/timeline` - Activity timeline
//! - `GET|POST /tips` - List / submit tips
//! - `GET|PATCH /tips/{id}` - Read / review a tip
//! - `POST /tips/{id}/link|unlink` - Link a tip into a case, or undo it
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `TENDERSCOPE_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `TENDERSCOPE_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `TENDERSCOPE_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{ENV_API_KEY, get_api_key_from_env};
pub use handlers::{ApiError, status_for};
pub use middleware::{ENV_RATE_LIMIT, create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    ActorRequest, AddEvidenceRequest, AddNoteRequest, AttachEntityRequest, AttachTenderRequest,
    CaseChangeResponse, CreateCaseRequest, ErrorResponse, HealthResponse, InvalidateResponse,
    InvestigateRequest, LinkTipRequest, StatusResponse, TipLinkResponse, UpdateCaseRequest,
};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::investigation::Orchestrator;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tenderscope_core::{HeuristicTriage, Ledger, TipTriage};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Environment variable holding the allowed CORS origins.
pub const ENV_CORS_ORIGINS: &str = "TENDERSCOPE_CORS_ORIGINS";

/// Interval between sweeps of expired cache entries.
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(300);

const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Cases and tips. Every mutation runs under the write lock.
    pub ledger: Arc<RwLock<Ledger>>,
    pub orchestrator: Arc<Orchestrator>,
    pub triage: Arc<dyn TipTriage>,
}

impl AppState {
    #[must_use]
    pub fn new(ledger: Ledger, orchestrator: Orchestrator, triage: Arc<dyn TipTriage>) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            orchestrator: Arc::new(orchestrator),
            triage,
        }
    }

    /// Build the orchestrator and triage from configuration around `ledger`.
    pub fn from_config(ledger: Ledger, config: &AppConfig) -> Result<Self, AppError> {
        let orchestrator = Orchestrator::from_config(config)?;
        let triage = Arc::new(HeuristicTriage::new(config.triage.clone()));
        Ok(Self::new(ledger, orchestrator, triage))
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from `TENDERSCOPE_CORS_ORIGINS`:
/// - "*": allows all origins (development only)
/// - unset: localhost only
/// - otherwise: comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var(ENV_CORS_ORIGINS).ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins ({}=*). This is insecure for production!",
                ENV_CORS_ORIGINS
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in {}, defaulting to localhost only",
                    ENV_CORS_ORIGINS
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(ALLOWED_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!(
                "CORS: No {} set, defaulting to localhost only",
                ENV_CORS_ORIGINS
            );
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit - 2 MiB
/// 4. Rate Limiting - protects against DoS (if enabled)
/// 5. Authentication - validates API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set {} to enable authentication.",
            ENV_API_KEY
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/investigations", post(handlers::investigate_handler))
        .route(
            "/investigations/{subject_type}/{subject_key}",
            delete(handlers::invalidate_handler),
        )
        .route(
            "/cases",
            get(handlers::list_cases_handler).post(handlers::create_case_handler),
        )
        .route(
            "/cases/{id}",
            get(handlers::get_case_handler).patch(handlers::update_case_handler),
        )
        .route("/cases/{id}/reopen", post(handlers::reopen_case_handler))
        .route("/cases/{id}/tenders", post(handlers::attach_tender_handler))
        .route("/cases/{id}/entities", post(handlers::attach_entity_handler))
        .route("/cases/{id}/evidence", post(handlers::add_evidence_handler))
        .route("/cases/{id}/notes", post(handlers::add_note_handler))
        .route("/cases/{id}/timeline", get(handlers::timeline_handler))
        .route(
            "/tips",
            get(handlers::list_tips_handler).post(handlers::submit_tip_handler),
        )
        .route(
            "/tips/{id}",
            get(handlers::get_tip_handler).patch(handlers::patch_tip_handler),
        )
        .route("/tips/{id}/link", post(handlers::link_tip_handler))
        .route("/tips/{id}/unlink", post(handlers::unlink_tip_handler));

    // Authentication is innermost and runs last on the request.
    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and run until Ctrl+C.
///
/// A background task evicts expired investigations every few minutes.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), AppError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let purger = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            orchestrator.purge_expired().await;
        }
    });

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Io(format!("Bind failed: {e}")))?;

    tracing::info!("Tenderscope HTTP server listening on {}", addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| AppError::Io(format!("Server error: {e}")));

    purger.abort();
    served
}

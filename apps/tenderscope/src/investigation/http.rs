//! # HTTP Collaborators
//!
//! Evidence sources and the synthesis service reached over JSON/HTTP.
//!
//! ## Wire format
//!
//! ```text
//! POST <source url>     {"subject_type": "tender", "subject_key": "UA-..."}
//!                   ->  [{"finding_type": "...", "description": "...",
//!                         "severity": "high", "evidence": [...], "confidence": 0.8}]
//!
//! POST <synthesis url>  {"subject": {...}, "findings": [...]}
//!                   ->  {"narrative": "...", "findings": [...]}
//! ```
//!
//! Every request is bounded by the time left until the investigation
//! deadline. Transport, status and decoding failures all surface as
//! [`InvestigatorError::Unavailable`]; a request that runs out of time is a
//! [`InvestigatorError::Timeout`] without partial findings.

use super::{InvestigatorError, SourceInvestigator, Synthesis, Synthesizer, UntaggedFinding};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tenderscope_core::{Finding, InvestigationQuery, Source};
use tokio::time::Instant;

#[derive(Debug, Deserialize)]
struct RemoteSynthesis {
    narrative: String,
    #[serde(default)]
    findings: Vec<UntaggedFinding>,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    subject: &'a InvestigationQuery,
    findings: &'a [Finding],
}

/// Time left until `deadline`, or a timeout error when none is left.
fn remaining(deadline: Instant) -> Result<Duration, InvestigatorError> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        Err(InvestigatorError::Timeout { partial: Vec::new() })
    } else {
        Ok(left)
    }
}

fn transport_error(e: reqwest::Error) -> InvestigatorError {
    if e.is_timeout() {
        InvestigatorError::Timeout { partial: Vec::new() }
    } else if let Some(status) = e.status() {
        InvestigatorError::Unavailable(format!("HTTP {}", status.as_u16()))
    } else if e.is_decode() {
        InvestigatorError::Unavailable(format!("malformed response: {e}"))
    } else {
        InvestigatorError::Unavailable(format!("request failed: {e}"))
    }
}

/// POST `body` to `url` and decode the JSON answer.
async fn post_json<B, T>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
    deadline: Instant,
) -> Result<T, InvestigatorError>
where
    B: Serialize + ?Sized,
    T: for<'de> Deserialize<'de>,
{
    let response = client
        .post(url)
        .timeout(remaining(deadline)?)
        .json(body)
        .send()
        .await
        .map_err(transport_error)?
        .error_for_status()
        .map_err(transport_error)?;
    response.json::<T>().await.map_err(transport_error)
}

// =============================================================================
// SOURCE INVESTIGATOR
// =============================================================================

/// One evidence source behind an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpInvestigator {
    source: Source,
    url: String,
    client: reqwest::Client,
}

impl HttpInvestigator {
    #[must_use]
    pub fn new(source: Source, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            source,
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl SourceInvestigator for HttpInvestigator {
    fn source(&self) -> Source {
        self.source
    }

    async fn investigate(
        &self,
        query: &InvestigationQuery,
        deadline: Instant,
    ) -> Result<Vec<Finding>, InvestigatorError> {
        let remote: Vec<UntaggedFinding> = post_json(&self.client, &self.url, query, deadline).await?;
        Ok(remote
            .into_iter()
            .map(|f| f.tag(self.source))
            .collect())
    }
}

// =============================================================================
// SYNTHESIZER
// =============================================================================

/// The synthesis service behind an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    url: String,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    #[must_use]
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        query: &InvestigationQuery,
        findings: &[Finding],
        deadline: Instant,
    ) -> Result<Synthesis, InvestigatorError> {
        let request = SynthesisRequest {
            subject: query,
            findings,
        };
        let remote: RemoteSynthesis = post_json(&self.client, &self.url, &request, deadline).await?;
        Ok(Synthesis {
            narrative: remote.narrative,
            findings: remote
                .findings
                .into_iter()
                .map(|f| f.tag(Source::Synthesis))
                .collect(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use tenderscope_core::{Severity, SubjectType};

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn query() -> InvestigationQuery {
        InvestigationQuery::new(SubjectType::Company, "Acme Build LLC").unwrap()
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn decodes_findings_and_tags_source() {
        let router = Router::new().route(
            "/investigate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["subject_type"], "company");
                Json(json!([{
                    "finding_type": "sanctions_match",
                    "description": "listed director",
                    "severity": "critical",
                    "evidence": ["https://registry.example/1"],
                    "confidence": 1.7
                }]))
            }),
        );
        let base = serve(router).await;
        let investigator =
            HttpInvestigator::new(Source::Registry, format!("{base}/investigate"), reqwest::Client::new());

        let findings = investigator.investigate(&query(), soon()).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].source, Source::Registry);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].confidence, Some(1.0));
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let router = Router::new().route(
            "/investigate",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let base = serve(router).await;
        let investigator =
            HttpInvestigator::new(Source::Web, format!("{base}/investigate"), reqwest::Client::new());

        let err = investigator.investigate(&query(), soon()).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503");
    }

    #[tokio::test]
    async fn malformed_body_is_unavailable() {
        let router = Router::new().route("/investigate", post(|| async { Json(json!({"oops": true})) }));
        let base = serve(router).await;
        let investigator =
            HttpInvestigator::new(Source::Web, format!("{base}/investigate"), reqwest::Client::new());

        let err = investigator.investigate(&query(), soon()).await.unwrap_err();
        assert!(matches!(err, InvestigatorError::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let router = Router::new().route(
            "/investigate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!([]))
            }),
        );
        let base = serve(router).await;
        let investigator =
            HttpInvestigator::new(Source::Web, format!("{base}/investigate"), reqwest::Client::new());

        let deadline = Instant::now() + Duration::from_millis(100);
        let err = investigator.investigate(&query(), deadline).await.unwrap_err();
        assert!(matches!(err, InvestigatorError::Timeout { .. }));
    }

    #[tokio::test]
    async fn expired_deadline_skips_the_request() {
        let investigator =
            HttpInvestigator::new(Source::Web, "http://127.0.0.1:9/never", reqwest::Client::new());
        let err = investigator.investigate(&query(), Instant::now()).await.unwrap_err();
        assert!(matches!(err, InvestigatorError::Timeout { .. }));
    }

    #[tokio::test]
    async fn synthesizer_receives_findings() {
        let router = Router::new().route(
            "/synthesize",
            post(|Json(body): Json<Value>| async move {
                let count = body["findings"].as_array().map_or(0, Vec::len);
                Json(json!({
                    "narrative": format!("{count} finding(s) point to a captured tender."),
                    "findings": [{
                        "finding_type": "synthesis",
                        "description": "pattern across sources",
                        "severity": "medium"
                    }]
                }))
            }),
        );
        let base = serve(router).await;
        let synthesizer = HttpSynthesizer::new(format!("{base}/synthesize"), reqwest::Client::new());
        let findings = vec![Finding::new(Source::History, "single_bidder", "one bid", Severity::High)];

        let synthesis = synthesizer.synthesize(&query(), &findings, soon()).await.unwrap();
        assert_eq!(synthesis.narrative, "1 finding(s) point to a captured tender.");
        assert_eq!(synthesis.findings[0].source, Source::Synthesis);
    }
}

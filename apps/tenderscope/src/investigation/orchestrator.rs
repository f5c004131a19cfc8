//! # Investigation Orchestrator
//!
//! Runs one investigation:
//!
//! 1. Return the cached result for the subject if it is still live
//! 2. Ask every registered source concurrently, all under one deadline
//! 3. Hand the collected findings to the synthesis collaborator, if any
//! 4. Merge and corroborate the findings, then score them
//! 5. Cache the result (unless every source failed) and return it
//!
//! A failing or late source never fails the investigation. It is recorded
//! as `false` in `sources_checked`, listed in `data_quality_gaps` and lowers
//! the confidence. When the deadline passes the remaining tasks are aborted
//! and whatever they would have returned is discarded. When no source
//! answered at all, partial findings are listed but not scored and the
//! result is `minimal`.
//!
//! The deadline is the configured one unless the caller passes its own.
//!
//! Sources are never retried here; a caller retries by investigating again.

use super::{
    InvestigationCache, InvestigatorError, ProgressEvent, SourceInvestigator, Synthesizer,
    http::{HttpInvestigator, HttpSynthesizer},
};
use crate::config::{AppConfig, ConfigError, OrchestratorConfig};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tenderscope_core::{
    EngineError, Finding, InvestigationQuery, InvestigationResult, RiskScorer, Source,
    SourceCoverage, merge_findings, primitives::MAX_FINDINGS_PER_SOURCE,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};

/// Gap reported when no evidence source is registered at all.
const NO_SOURCES_GAP: &str = "no evidence sources are configured";

/// Fans queries out to the registered sources and scores the outcome.
pub struct Orchestrator {
    investigators: Vec<Arc<dyn SourceInvestigator>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    scorer: RiskScorer,
    deadline: Duration,
    cache: InvestigationCache,
}

impl Orchestrator {
    /// Create an orchestrator without sources.
    #[must_use]
    pub fn new(scorer: RiskScorer, config: OrchestratorConfig) -> Self {
        Self {
            investigators: Vec::new(),
            synthesizer: None,
            scorer,
            deadline: config.deadline(),
            cache: InvestigationCache::new(config.cache_ttl()),
        }
    }

    /// Build the scorer and one HTTP source per configured endpoint.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let scorer = RiskScorer::new(config.scoring.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let mut orchestrator = Self::new(scorer, config.orchestrator);

        if config.sources.is_empty() && config.synthesis.is_none() {
            return Ok(orchestrator);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("tenderscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot build HTTP client: {e}")))?;

        for endpoint in &config.sources {
            orchestrator
                .register(Arc::new(HttpInvestigator::new(
                    endpoint.source,
                    &endpoint.url,
                    client.clone(),
                )))
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if let Some(synthesis) = &config.synthesis {
            orchestrator.set_synthesizer(Arc::new(HttpSynthesizer::new(&synthesis.url, client)));
        }
        Ok(orchestrator)
    }

    /// Add an evidence source. Each source may be registered once; the
    /// synthesis source goes through [`Orchestrator::set_synthesizer`].
    pub fn register(&mut self, investigator: Arc<dyn SourceInvestigator>) -> Result<(), EngineError> {
        let source = investigator.source();
        if source == Source::Synthesis {
            return Err(EngineError::InvalidInput(
                "the synthesis source is registered with set_synthesizer".to_string(),
            ));
        }
        if self.investigators.iter().any(|i| i.source() == source) {
            return Err(EngineError::InvalidInput(format!(
                "source '{source}' is already registered"
            )));
        }
        self.investigators.push(investigator);
        Ok(())
    }

    pub fn set_synthesizer(&mut self, synthesizer: Arc<dyn Synthesizer>) {
        self.synthesizer = Some(synthesizer);
    }

    /// Every registered source, synthesis included, in `Source` order.
    #[must_use]
    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.investigators.iter().map(|i| i.source()).collect();
        if self.synthesizer.is_some() {
            sources.push(Source::Synthesis);
        }
        sources.sort();
        sources
    }

    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    #[must_use]
    pub fn cache(&self) -> &InvestigationCache {
        &self.cache
    }

    #[must_use]
    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    // =========================================================================
    // INVESTIGATE
    // =========================================================================

    /// Investigate a subject. Fails only for a malformed query.
    pub async fn investigate(&self, query: InvestigationQuery) -> Result<InvestigationResult, EngineError> {
        self.investigate_with_progress(query, None, None).await
    }

    /// Investigate a subject under `deadline` instead of the configured one.
    pub async fn investigate_within(
        &self,
        query: InvestigationQuery,
        deadline: Duration,
    ) -> Result<InvestigationResult, EngineError> {
        self.investigate_with_progress(query, Some(deadline), None).await
    }

    /// Investigate a subject, reporting each source's completion on `progress`.
    ///
    /// `deadline` overrides the configured deadline for this call; it only
    /// matters when the result is not served from the cache. A closed
    /// receiver does not affect the investigation.
    pub async fn investigate_with_progress(
        &self,
        query: InvestigationQuery,
        deadline: Option<Duration>,
        progress: Option<&UnboundedSender<ProgressEvent>>,
    ) -> Result<InvestigationResult, EngineError> {
        let query = query.validated()?;
        let key = query.cache_key();
        let progress = Progress(progress);
        let budget = deadline.unwrap_or(self.deadline);

        let result = self
            .cache
            .get_or_compute(&key, || async {
                let result = self.run(&query, budget, &progress).await;
                let cacheable = !result.all_sources_failed();
                Ok::<_, EngineError>((result, cacheable))
            })
            .await?;

        if result.cached {
            tracing::debug!(subject = %query, risk_score = result.risk_score, "Served investigation from cache");
        }
        progress.emit(ProgressEvent::Finished {
            risk_score: result.risk_score,
            cached: result.cached,
        });
        Ok(result)
    }

    /// Drop the cached result for `query`. Returns whether one existed.
    pub async fn invalidate(&self, query: &InvestigationQuery) -> bool {
        self.cache.invalidate(&query.cache_key()).await
    }

    /// Evict expired cache entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let purged = self.cache.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired investigations");
        }
        purged
    }

    async fn run(
        &self,
        query: &InvestigationQuery,
        budget: Duration,
        progress: &Progress<'_>,
    ) -> InvestigationResult {
        let started = Instant::now();
        let deadline = started + budget;
        let sources = self.sources();

        tracing::info!(
            subject = %query,
            sources = sources.len(),
            deadline_ms = budget.as_millis() as u64,
            "Investigation started"
        );
        progress.emit(ProgressEvent::Started {
            sources: sources.clone(),
        });

        let mut round = Round::new(&sources);
        self.fan_out(query, deadline, &mut round, progress).await;

        if let Some(synthesizer) = &self.synthesizer {
            let evidence = merge_findings(round.findings.clone());
            let outcome = match timeout_at(deadline, synthesizer.synthesize(query, &evidence, deadline)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(InvestigatorError::Timeout { partial: Vec::new() }),
            };
            match outcome {
                Ok(synthesis) => {
                    let narrative = synthesis.narrative.trim();
                    if !narrative.is_empty() {
                        round.narrative = Some(narrative.to_string());
                    }
                    round.answered(Source::Synthesis, synthesis.findings, progress);
                }
                Err(error) => round.failed(Source::Synthesis, error, progress),
            }
        }

        let (findings, checked, mut gaps, narrative) = round.finish();
        if checked.is_empty() {
            gaps.push(NO_SOURCES_GAP.to_string());
        }

        let coverage = SourceCoverage {
            registered: checked.len(),
            missing: checked
                .iter()
                .filter(|(_, answered)| !**answered)
                .map(|(source, _)| *source)
                .collect(),
        };
        // Partial findings of sources that all failed are evidence of nothing.
        let scored: &[Finding] = if coverage.registered > 0 && coverage.answered() == 0 {
            &[]
        } else {
            &findings
        };
        let score = self.scorer.score(scored, &coverage);
        let result = InvestigationResult::assemble(
            query.clone(),
            findings,
            score,
            checked,
            gaps,
            narrative,
            Utc::now(),
        );

        tracing::info!(
            subject = %query,
            risk_score = result.risk_score,
            risk_level = %result.risk_level,
            findings = result.findings.len(),
            missing = coverage.missing.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Investigation finished"
        );
        result
    }

    /// Ask every evidence source concurrently until all answered or the
    /// deadline passed.
    async fn fan_out(
        &self,
        query: &InvestigationQuery,
        deadline: Instant,
        round: &mut Round,
        progress: &Progress<'_>,
    ) {
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, Source> = HashMap::new();

        for investigator in &self.investigators {
            let source = investigator.source();
            let investigator = Arc::clone(investigator);
            let query = query.clone();
            let handle = tasks.spawn(async move { investigator.investigate(&query, deadline).await });
            pending.insert(handle.id(), source);
        }

        loop {
            let joined = match timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    tasks.abort_all();
                    break;
                }
            };
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => (
                    e.id(),
                    Err(InvestigatorError::Unavailable(format!("investigator task failed: {e}"))),
                ),
            };
            let Some(source) = pending.remove(&id) else {
                continue;
            };
            match outcome {
                Ok(findings) => round.answered(source, findings, progress),
                Err(error) => round.failed(source, error, progress),
            }
        }

        // Dropping the set aborts stragglers; their results are never read.
        drop(tasks);

        let mut late: Vec<Source> = pending.into_values().collect();
        late.sort();
        for source in late {
            round.failed(
                source,
                InvestigatorError::Unavailable("no answer before the deadline".to_string()),
                progress,
            );
        }
    }
}

// =============================================================================
// ROUND STATE
// =============================================================================

/// Findings and per-source outcomes gathered during one investigation.
struct Round {
    findings: Vec<Finding>,
    checked: BTreeMap<Source, bool>,
    failures: BTreeMap<Source, String>,
    narrative: Option<String>,
}

impl Round {
    fn new(sources: &[Source]) -> Self {
        Self {
            findings: Vec::new(),
            checked: sources.iter().map(|s| (*s, false)).collect(),
            failures: BTreeMap::new(),
            narrative: None,
        }
    }

    fn answered(&mut self, source: Source, findings: Vec<Finding>, progress: &Progress<'_>) {
        let findings = accept(source, findings);
        tracing::debug!(source = %source, findings = findings.len(), "Source answered");
        progress.emit(ProgressEvent::SourceCompleted {
            source,
            findings: findings.len(),
        });
        self.checked.insert(source, true);
        self.findings.extend(findings);
    }

    fn failed(&mut self, source: Source, error: InvestigatorError, progress: &Progress<'_>) {
        let (partial, error) = error.into_parts(source);
        let reason = error.to_string();
        tracing::warn!(source = %source, reason = %reason, partial = partial.len(), "Source unavailable");
        progress.emit(ProgressEvent::SourceFailed {
            source,
            reason: reason.clone(),
        });
        self.checked.insert(source, false);
        self.failures.insert(source, reason);
        self.findings.extend(accept(source, partial));
    }

    fn finish(self) -> (Vec<Finding>, BTreeMap<Source, bool>, Vec<String>, Option<String>) {
        (
            merge_findings(self.findings),
            self.checked,
            self.failures.into_values().collect(),
            self.narrative,
        )
    }
}

/// Cap a source's findings and tag them with that source.
fn accept(source: Source, mut findings: Vec<Finding>) -> Vec<Finding> {
    if findings.len() > MAX_FINDINGS_PER_SOURCE {
        tracing::warn!(
            source = %source,
            returned = findings.len(),
            kept = MAX_FINDINGS_PER_SOURCE,
            "Source returned too many findings"
        );
        findings.truncate(MAX_FINDINGS_PER_SOURCE);
    }
    findings
        .into_iter()
        .map(|f| if f.source == source { f } else { Finding { source, ..f } })
        .collect()
}

/// Optional progress channel; send errors mean nobody is listening.
struct Progress<'a>(Option<&'a UnboundedSender<ProgressEvent>>);

impl Progress<'_> {
    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = self.0 {
            let _ = tx.send(event);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::{CaseCommand, TipCommand};
use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::investigation::{Orchestrator, StaticInvestigator, UntaggedFinding};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tenderscope_core::{
    Case, CaseFilter, CaseId, CaseMutation, CaseStatus, EngineError, HeuristicTriage,
    InvestigationQuery, InvestigationResult, Ledger, NewCase, RiskScorer, Source, SubjectType,
    TenderLink, Tip, TipFilter, TipId, TipSubmission,
};

/// Database used by record commands when neither `--database` nor the
/// configuration names one.
pub const DEFAULT_DATABASE: &str = "tenderscope.redb";

/// Maximum size of an `investigate --fixtures` file (10 MB).
const MAX_FIXTURE_FILE_SIZE: u64 = 10 * 1024 * 1024;

// =============================================================================
// COMMAND ENVIRONMENT
// =============================================================================

/// Configuration and output settings shared by every command.
#[derive(Debug, Clone)]
pub struct CommandEnv {
    pub config: AppConfig,
    pub json_mode: bool,
}

impl CommandEnv {
    /// Load the configuration; `database` wins over the file and environment.
    pub fn load(
        config_path: Option<&Path>,
        database: Option<PathBuf>,
        json_mode: bool,
    ) -> Result<Self, AppError> {
        let mut config = AppConfig::load(config_path)?;
        if database.is_some() {
            config.database = database;
        }
        Ok(Self { config, json_mode })
    }

    /// Database path for the record commands.
    #[must_use]
    pub fn record_database(&self) -> PathBuf {
        self.config
            .database
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }

    /// Open the persistent ledger used by the `case` and `tip` commands.
    pub fn open_ledger(&self) -> Result<Ledger, AppError> {
        Ok(Ledger::with_redb(self.record_database())?)
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// Read a user-supplied file after checking its size.
fn read_input_file(path: &Path, max_size: u64) -> Result<String, AppError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| AppError::Io(format!("Cannot read '{}': {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(AppError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    if metadata.len() > max_size {
        return Err(AppError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    std::fs::read_to_string(path)
        .map_err(|e| AppError::Io(format!("Cannot read '{}': {}", path.display(), e)))
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
///
/// Without a configured database, cases and tips live in memory and are lost
/// on shutdown.
pub async fn cmd_server(env: &CommandEnv, host: &str, port: u16) -> Result<(), AppError> {
    let ledger = match &env.config.database {
        Some(path) => Ledger::with_redb(path)?,
        None => {
            tracing::warn!("No database configured; cases and tips are kept in memory only");
            Ledger::new()
        }
    };
    let state = AppState::from_config(ledger, &env.config)?;
    let sources: Vec<&str> = state.orchestrator.sources().iter().map(Source::as_str).collect();

    println!("Tenderscope Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:      {}", host);
    println!("  Port:      {}", port);
    match &env.config.database {
        Some(path) => println!("  Database:  {:?}", path),
        None => println!("  Database:  (in memory)"),
    }
    println!("  Sources:   {}", if sources.is_empty() { "(none)".to_string() } else { sources.join(", ") });
    println!("  Deadline:  {} ms", env.config.orchestrator.deadline_ms);
    println!("  Cache TTL: {} s", env.config.orchestrator.cache_ttl_secs);
    println!();
    println!("Endpoints:");
    println!("  POST /investigations          - Investigate a subject");
    println!("  GET  /cases, POST /cases      - List / open cases");
    println!("  GET  /cases/{{id}}/timeline     - Case activity");
    println!("  GET  /tips, POST /tips        - List / submit tips");
    println!("  POST /tips/{{id}}/link          - Link a tip into a case");
    println!("  GET  /status                  - Server status");
    println!("  GET  /health                  - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, state).await
}

// =============================================================================
// INVESTIGATE COMMAND
// =============================================================================

/// Investigate one subject and print the result.
pub async fn cmd_investigate(
    env: &CommandEnv,
    subject_type: SubjectType,
    subject_key: &str,
    fixtures: Option<&Path>,
    progress: bool,
    deadline_ms: Option<u64>,
) -> Result<(), AppError> {
    let query = InvestigationQuery::new(subject_type, subject_key)?;
    let deadline = match deadline_ms {
        Some(0) => {
            return Err(EngineError::InvalidQuery("--deadline-ms must be positive".to_string()).into());
        }
        Some(ms) => Some(std::time::Duration::from_millis(ms)),
        None => None,
    };
    let orchestrator = match fixtures {
        Some(path) => fixture_orchestrator(&env.config, path)?,
        None => Orchestrator::from_config(&env.config)?,
    };
    if orchestrator.sources().is_empty() {
        tracing::warn!("No evidence sources configured; add [[sources]] to the configuration or pass --fixtures");
    }

    let result = if progress {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                eprintln!("{}", serde_json::to_string(&event).unwrap_or_default());
            }
        });
        let result = orchestrator.investigate_with_progress(query, deadline, Some(&tx)).await;
        drop(tx);
        let _ = printer.await;
        result?
    } else {
        orchestrator.investigate_with_progress(query, deadline, None).await?
    };

    if env.json_mode {
        print_json(&result);
    } else {
        print_result(&result);
    }
    Ok(())
}

/// Build an orchestrator whose sources answer from a fixtures file:
/// `{"history": [{"finding_type": ..., "description": ..., "severity": ...}], ...}`.
fn fixture_orchestrator(config: &AppConfig, path: &Path) -> Result<Orchestrator, AppError> {
    let text = read_input_file(path, MAX_FIXTURE_FILE_SIZE)?;
    let fixtures: BTreeMap<Source, Vec<UntaggedFinding>> = serde_json::from_str(&text)
        .map_err(|e| EngineError::Serialization(format!("invalid fixtures file: {e}")))?;

    let mut orchestrator = Orchestrator::new(RiskScorer::new(config.scoring.clone())?, config.orchestrator);
    for (source, findings) in fixtures {
        let findings = findings.into_iter().map(|f| f.tag(source)).collect();
        orchestrator.register(Arc::new(StaticInvestigator::new(source, findings)))?;
    }
    Ok(orchestrator)
}

fn print_result(result: &InvestigationResult) {
    println!("Subject:    {}", result.subject);
    println!(
        "Risk:       {}/100 ({})  confidence {:.2}{}",
        result.risk_score,
        result.risk_level,
        result.confidence,
        if result.cached { "  [cached]" } else { "" }
    );
    let sources: Vec<String> = result
        .sources_checked
        .iter()
        .map(|(source, ok)| format!("{}{}", source, if *ok { "" } else { " (failed)" }))
        .collect();
    println!("Sources:    {}", sources.join(", "));
    println!();

    if result.findings.is_empty() {
        println!("Findings:   none");
    } else {
        println!("Findings:");
        for finding in &result.findings {
            println!(
                "  [{}] {}/{}: {}{}",
                finding.severity,
                finding.source,
                finding.finding_type,
                finding.description,
                if finding.corroborated { " (corroborated)" } else { "" }
            );
        }
    }
    if !result.data_quality_gaps.is_empty() {
        println!("Gaps:");
        for gap in &result.data_quality_gaps {
            println!("  - {}", gap);
        }
    }
    if !result.recommendations.is_empty() {
        println!("Recommendations:");
        for recommendation in &result.recommendations {
            println!("  - {}", recommendation);
        }
    }
    println!();
    println!("{}", result.summary);
    if let Some(synthesis) = &result.synthesis {
        println!();
        println!("{}", synthesis);
    }
}

// =============================================================================
// CASE COMMANDS
// =============================================================================

/// Run a `case` subcommand against the persistent ledger.
pub fn cmd_case(env: &CommandEnv, command: CaseCommand) -> Result<(), AppError> {
    let mut ledger = env.open_ledger()?;

    match command {
        CaseCommand::Create {
            title,
            description,
            priority,
            assign,
            tenders,
            actor,
        } => {
            let draft = NewCase {
                title,
                description,
                priority,
                assigned_to: assign,
                tenders: tenders
                    .into_iter()
                    .map(|tender_id| TenderLink {
                        tender_id,
                        role: None,
                    })
                    .collect(),
                entities: Vec::new(),
            };
            let case = ledger.create_case(draft, actor.as_deref())?;
            if env.json_mode {
                print_json(&case);
            } else {
                println!("Opened case #{}: {}", case.id.0, case.title);
            }
        }
        CaseCommand::List {
            status,
            priority,
            assigned_to,
            limit,
        } => {
            let cases = ledger.cases(&CaseFilter {
                status,
                priority,
                assigned_to,
                limit,
            })?;
            if env.json_mode {
                print_json(&cases);
            } else if cases.is_empty() {
                println!("No cases.");
            } else {
                for case in &cases {
                    println!(
                        "#{:<5} {:<12} {:<9} {:<14} {}",
                        case.id.0,
                        case.status,
                        case.priority,
                        case.assigned_to.as_deref().unwrap_or("-"),
                        case.title
                    );
                }
            }
        }
        CaseCommand::Show { id } => {
            let case = ledger.case(CaseId(id))?;
            if env.json_mode {
                print_json(&case);
            } else {
                print_case(&case);
            }
        }
        CaseCommand::Status {
            id,
            status,
            actor,
            expected_version,
        } => {
            let mutation = match status {
                CaseStatus::Open => CaseMutation::Reopen,
                other => CaseMutation::SetStatus(other),
            };
            let outcome =
                ledger.mutate_case(CaseId(id), mutation, actor.as_deref(), expected_version)?;
            if env.json_mode {
                print_json(&outcome.case);
            } else if outcome.entry.is_some() {
                println!("Case #{} is now {}", id, outcome.case.status);
            } else {
                println!("Case #{} is already {}", id, outcome.case.status);
            }
        }
        CaseCommand::Note { id, content, author } => {
            let outcome = ledger.mutate_case(
                CaseId(id),
                CaseMutation::AddNote {
                    content,
                    author: author.clone(),
                },
                author.as_deref(),
                None,
            )?;
            if env.json_mode {
                print_json(&outcome.case.notes.last());
            } else {
                println!("Added note to case #{}", id);
            }
        }
        CaseCommand::Timeline { id } => {
            let entries = ledger.timeline(CaseId(id))?;
            if env.json_mode {
                print_json(&entries);
            } else {
                for entry in &entries {
                    println!(
                        "{}  {:<20} {:<12} {}",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.action,
                        entry.actor.as_deref().unwrap_or("-"),
                        entry.details.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_case(case: &Case) {
    println!("Case #{} (version {})", case.id.0, case.version);
    println!("  Title:       {}", case.title);
    println!("  Status:      {}", case.status);
    println!("  Priority:    {}", case.priority);
    println!("  Assigned to: {}", case.assigned_to.as_deref().unwrap_or("-"));
    println!("  Opened:      {}", case.created_at.format("%Y-%m-%d %H:%M:%S"));
    if !case.description.is_empty() {
        println!();
        println!("{}", case.description);
    }
    if !case.tenders.is_empty() {
        println!();
        println!("Tenders:");
        for tender in &case.tenders {
            println!("  - {}", tender.tender_id);
        }
    }
    if !case.entities.is_empty() {
        println!();
        println!("Entities:");
        for entity in &case.entities {
            println!("  - {} ({})", entity.entity_name, entity.entity_type);
        }
    }
    if !case.evidence.is_empty() {
        println!();
        println!("Evidence:");
        for evidence in &case.evidence {
            println!(
                "  [{}] {} ({}, from {})",
                evidence.severity, evidence.title, evidence.evidence_type, evidence.source_module
            );
        }
    }
    if !case.notes.is_empty() {
        println!();
        println!("Notes:");
        for note in &case.notes {
            println!(
                "  {} {}: {}",
                note.created_at.format("%Y-%m-%d %H:%M"),
                note.author.as_deref().unwrap_or("anonymous"),
                note.content
            );
        }
    }
}

// =============================================================================
// TIP COMMANDS
// =============================================================================

/// Run a `tip` subcommand against the persistent ledger.
pub fn cmd_tip(env: &CommandEnv, command: TipCommand) -> Result<(), AppError> {
    let mut ledger = env.open_ledger()?;

    match command {
        TipCommand::Submit {
            category,
            description,
        } => {
            let triage = HeuristicTriage::new(env.config.triage.clone());
            let tip = ledger.submit_tip(
                TipSubmission {
                    category,
                    description,
                },
                &triage,
            )?;
            if env.json_mode {
                print_json(&tip);
            } else {
                println!("Received tip #{} (urgency: {})", tip.id.0, tip.urgency);
            }
        }
        TipCommand::List {
            status,
            category,
            urgency,
            limit,
        } => {
            let tips = ledger.tips(&TipFilter {
                status,
                category,
                urgency,
                limit,
            })?;
            if env.json_mode {
                print_json(&tips);
            } else if tips.is_empty() {
                println!("No tips.");
            } else {
                for tip in &tips {
                    println!(
                        "#{:<5} {:<13} {:<21} {:<8} {}",
                        tip.id.0,
                        tip.status,
                        tip.category,
                        tip.urgency,
                        tip.submitted_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        TipCommand::Show { id } => {
            let tip = ledger.tip(TipId(id))?;
            if env.json_mode {
                print_json(&tip);
            } else {
                print_tip(&tip);
            }
        }
        TipCommand::Link { id, case_id, actor } => {
            let outcome = ledger.link_tip(TipId(id), CaseId(case_id), actor.as_deref())?;
            if env.json_mode {
                print_json(&outcome.tip);
            } else {
                println!(
                    "Linked tip #{} to case #{} (case now {})",
                    id, case_id, outcome.case.status
                );
            }
        }
    }
    Ok(())
}

fn print_tip(tip: &Tip) {
    println!("Tip #{}", tip.id.0);
    println!("  Category:  {}", tip.category);
    println!("  Status:    {}", tip.status);
    println!("  Urgency:   {}", tip.urgency);
    match tip.triage_score {
        Some(score) => println!("  Triage:    {:.2}", score),
        None => println!("  Triage:    not scored"),
    }
    if let Some(case_id) = tip.linked_case_id {
        println!("  Case:      #{}", case_id.0);
    }
    println!("  Submitted: {}", tip.submitted_at.format("%Y-%m-%d %H:%M:%S"));
    println!();
    println!("{}", tip.description);
    if !tip.extracted_entities.is_empty() {
        println!();
        println!("Entities:");
        for entity in &tip.extracted_entities {
            println!("  - {} ({})", entity.name, entity.entity_type);
        }
    }
    if !tip.matched_tenders.is_empty() {
        println!();
        println!("Tenders:");
        for tender in &tip.matched_tenders {
            println!("  - {}", tender.tender_id);
        }
    }
    if let Some(note) = &tip.analyst_note {
        println!();
        println!("Analyst note: {}", note);
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(env: &CommandEnv, force: bool) -> Result<(), AppError> {
    let db_path = env.record_database();
    if db_path.exists() {
        if !force {
            return Err(AppError::Io(format!(
                "Database {:?} already exists. Use --force to overwrite.",
                db_path
            )));
        }
        std::fs::remove_file(&db_path)
            .map_err(|e| AppError::Io(format!("Cannot remove {:?}: {}", db_path, e)))?;
    }

    let _ledger = Ledger::with_redb(&db_path)?;
    println!("Initialized new redb database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

//! # Tenderscope CLI Module
//!
//! This module implements the CLI interface for Tenderscope.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `investigate` - Investigate a tender, company or institution
//! - `case` - Create, list, show and update investigation cases
//! - `tip` - Submit, list, show and link whistleblower tips
//! - `init` - Initialize a new database

mod commands;

use crate::error::AppError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tenderscope_core::{CaseStatus, Priority, SubjectType, TipCategory, TipStatus, Urgency};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Tenderscope - procurement risk investigation and case management
///
/// Investigates tenders and the organisations around them, scores the risk
/// and keeps the cases and tips analysts work on.
#[derive(Parser, Debug)]
#[command(name = "tenderscope")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the redb database (overrides the configuration)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Investigate a subject against every configured source
    Investigate {
        /// Subject type (tender, company, institution)
        subject_type: SubjectType,

        /// Tender identifier, company code or institution name
        subject_key: String,

        /// JSON file mapping source names to canned findings; replaces the
        /// configured sources
        #[arg(short, long)]
        fixtures: Option<PathBuf>,

        /// Print progress events to stderr as sources complete
        #[arg(long)]
        progress: bool,

        /// Deadline for this investigation; defaults to the configured one
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Manage investigation cases
    #[command(subcommand)]
    Case(CaseCommand),

    /// Manage whistleblower tips
    #[command(subcommand)]
    Tip(TipCommand),

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },
}

/// `case` subcommands.
#[derive(Subcommand, Debug)]
pub enum CaseCommand {
    /// Open a new case
    Create {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// low, medium, high or critical (default: medium)
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Analyst the case is assigned to
        #[arg(short, long)]
        assign: Option<String>,

        /// Tender identifiers to attach
        #[arg(long = "tender")]
        tenders: Vec<String>,

        /// Who is acting
        #[arg(long)]
        actor: Option<String>,
    },

    /// List cases, newest first
    List {
        #[arg(short, long)]
        status: Option<CaseStatus>,

        #[arg(short, long)]
        priority: Option<Priority>,

        #[arg(short, long)]
        assigned_to: Option<String>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one case with its evidence and notes
    Show { id: u64 },

    /// Move a case to a new status (`open` reopens a closed or archived case)
    Status {
        id: u64,

        status: CaseStatus,

        #[arg(long)]
        actor: Option<String>,

        /// Fail if the case changed since this version was read
        #[arg(long)]
        expected_version: Option<u64>,
    },

    /// Add an analyst note
    Note {
        id: u64,

        content: String,

        #[arg(short, long)]
        author: Option<String>,
    },

    /// Show the activity timeline, oldest first
    Timeline { id: u64 },
}

/// `tip` subcommands.
#[derive(Subcommand, Debug)]
pub enum TipCommand {
    /// Submit a tip and triage it
    Submit {
        /// bid_rigging, conflict_of_interest, bribery, fraud or other
        #[arg(short, long)]
        category: TipCategory,

        #[arg(short, long)]
        description: String,
    },

    /// List tips, newest first
    List {
        #[arg(short, long)]
        status: Option<TipStatus>,

        #[arg(short, long)]
        category: Option<TipCategory>,

        #[arg(short, long)]
        urgency: Option<Urgency>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one tip with its triage assessment
    Show { id: u64 },

    /// Link a tip into a case as evidence
    Link {
        id: u64,

        case_id: u64,

        #[arg(long)]
        actor: Option<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), AppError> {
    let env = CommandEnv::load(cli.config.as_deref(), cli.database, cli.json_mode)?;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&env, &host, port).await,
        Some(Commands::Investigate {
            subject_type,
            subject_key,
            fixtures,
            progress,
            deadline_ms,
        }) => {
            cmd_investigate(
                &env,
                subject_type,
                &subject_key,
                fixtures.as_deref(),
                progress,
                deadline_ms,
            )
            .await
        }
        Some(Commands::Case(command)) => cmd_case(&env, command),
        Some(Commands::Tip(command)) => cmd_tip(&env, command),
        Some(Commands::Init { force }) => cmd_init(&env, force),
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}

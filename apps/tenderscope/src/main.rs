//! # Tenderscope - Procurement Risk Investigation Server
//!
//! The main binary for the Tenderscope investigation and case engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for investigations, cases and tips
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 apps/tenderscope (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐     │
//! │  │   CLI       │    │   HTTP API  │    │   Orchestrator   │     │
//! │  │  (clap)     │    │   (axum)    │    │ (sources, cache) │     │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘     │
//! │         │                  │                    │               │
//! │         └──────────────────┼────────────────────┘               │
//! │                            ▼                                    │
//! │                  ┌──────────────────┐                           │
//! │                  │ tenderscope-core │                           │
//! │                  │   (THE LOGIC)    │                           │
//! │                  └──────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! tenderscope --config tenderscope.toml server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! tenderscope investigate tender UA-2024-03-01-000042 --fixtures demo.json
//! tenderscope case create --title "Road repair cartel" --priority high
//! tenderscope tip list --status submitted
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // TENDERSCOPE_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("TENDERSCOPE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tenderscope=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = tenderscope::cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }
    if cli.verbose {
        tracing::debug!(?cli, "Parsed command line");
    }

    if let Err(e) = tenderscope::cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Tenderscope startup banner.
fn print_banner() {
    println!(
        r#"
  ▀█▀ █▀▀ █▄ █ █▀▄ █▀▀ █▀█ █▀ █▀▀ █▀█ █▀█ █▀▀
   █  ██▄ █ ▀█ █▄▀ ██▄ █▀▄ ▄█ █▄▄ █▄█ █▀▀ ██▄

  Procurement Risk Investigation v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}

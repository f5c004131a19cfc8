//! # Tenderscope
//!
//! The application crate: everything that needs a network, a runtime or a
//! process environment around the pure `tenderscope-core` engine.
//!
//! - [`investigation`]: source investigators, orchestrator and cache
//! - [`api`]: axum REST API
//! - [`cli`]: clap command-line interface
//! - [`config`]: TOML + environment configuration

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod investigation;

pub use config::{AppConfig, ConfigError};
pub use error::AppError;

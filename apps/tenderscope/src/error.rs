//! # Application Errors
//!
//! Errors of the binary: engine errors, configuration errors and I/O
//! outside the engine (binding sockets, reading input files).

use crate::config::ConfigError;
use tenderscope_core::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(String),
}

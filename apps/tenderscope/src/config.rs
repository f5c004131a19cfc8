//! # Configuration
//!
//! Application settings loaded from an optional TOML file, then overridden
//! by `TENDERSCOPE_*` environment variables.
//!
//! ```toml
//! database = "tenderscope.redb"
//!
//! [orchestrator]
//! deadline_ms = 20000
//! cache_ttl_secs = 21600
//!
//! [scoring]
//! corroboration_multiplier = 1.25
//!
//! [[sources]]
//! source = "registry"
//! url = "http://registry-verifier.internal/investigate"
//!
//! [synthesis]
//! url = "http://synthesis.internal/synthesize"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tenderscope_core::{
    ScoringConfig, Source, TriageConfig,
    primitives::{DEFAULT_CACHE_TTL_SECS, DEFAULT_INVESTIGATION_DEADLINE_MS},
};
use thiserror::Error;

/// Environment variable overriding `orchestrator.cache_ttl_secs`.
pub const ENV_CACHE_TTL_SECS: &str = "TENDERSCOPE_CACHE_TTL_SECS";
/// Environment variable overriding `orchestrator.deadline_ms`.
pub const ENV_DEADLINE_MS: &str = "TENDERSCOPE_DEADLINE_MS";
/// Environment variable overriding `database`.
pub const ENV_DATABASE: &str = "TENDERSCOPE_DATABASE";

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config '{path}': {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Cannot parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Deadline and cache settings of the investigation orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Shared deadline for one investigation, in milliseconds.
    pub deadline_ms: u64,
    /// Lifetime of a cached investigation result, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_INVESTIGATION_DEADLINE_MS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// One evidence source reached over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEndpoint {
    pub source: Source,
    pub url: String,
}

/// The language-model synthesis collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisEndpoint {
    pub url: String,
}

// =============================================================================
// APP CONFIG
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path of the redb database; `None` keeps cases and tips in memory.
    pub database: Option<PathBuf>,
    pub orchestrator: OrchestratorConfig,
    pub scoring: ScoringConfig,
    pub triage: TriageConfig,
    pub sources: Vec<SourceEndpoint>,
    pub synthesis: Option<SynthesisEndpoint>,
}

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |e: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let size = std::fs::metadata(path).map_err(io_err)?.len();
        if size > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "config file size {} bytes exceeds maximum {} bytes",
                size, MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(io_err)?;
        Self::from_toml(&text)
    }

    /// Load the file (if any), apply process environment overrides and
    /// validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TENDERSCOPE_*` overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(value) = read(ENV_CACHE_TTL_SECS) {
            self.orchestrator.cache_ttl_secs = parse_number(ENV_CACHE_TTL_SECS, &value)?;
        }
        if let Some(value) = read(ENV_DEADLINE_MS) {
            self.orchestrator.deadline_ms = parse_number(ENV_DEADLINE_MS, &value)?;
        }
        if let Some(value) = read(ENV_DATABASE) {
            self.database = Some(PathBuf::from(value.trim()));
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.deadline_ms == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.deadline_ms must be positive".to_string(),
            ));
        }
        self.scoring
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut seen = BTreeSet::new();
        for endpoint in &self.sources {
            if endpoint.source == Source::Synthesis {
                return Err(ConfigError::Invalid(
                    "the synthesis source is configured in [synthesis], not [[sources]]".to_string(),
                ));
            }
            if !seen.insert(endpoint.source) {
                return Err(ConfigError::Invalid(format!(
                    "source '{}' is configured twice",
                    endpoint.source
                )));
            }
            check_url(&endpoint.url)?;
        }
        if let Some(synthesis) = &self.synthesis {
            check_url(&synthesis.url)?;
        }
        Ok(())
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a non-negative integer, got '{value}'")))
}

fn check_url(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "endpoint '{url}' must be an http(s) URL"
        )))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_document_is_the_default() {
        let config = AppConfig::from_toml("").expect("parse");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.orchestrator.cache_ttl(), Duration::from_secs(6 * 60 * 60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_sources_and_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            database = "cases.redb"

            [orchestrator]
            deadline_ms = 1500

            [scoring.weights]
            critical = 30.0

            [[sources]]
            source = "registry"
            url = "http://localhost:9001/investigate"

            [synthesis]
            url = "https://llm.example/synthesize"
            "#,
        )
        .expect("parse");

        assert_eq!(config.database.as_deref(), Some(Path::new("cases.redb")));
        assert_eq!(config.orchestrator.deadline_ms, 1500);
        assert_eq!(config.orchestrator.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
        assert_eq!(config.scoring.weights.critical, 30.0);
        assert_eq!(config.scoring.weights.high, 10.0);
        assert_eq!(config.sources[0].source, Source::Registry);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            (ENV_CACHE_TTL_SECS, "60"),
            (ENV_DEADLINE_MS, " 250 "),
            (ENV_DATABASE, ""),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(ToString::to_string))
            .expect("overrides");
        assert_eq!(config.orchestrator.cache_ttl_secs, 60);
        assert_eq!(config.orchestrator.deadline_ms, 250);
        assert!(config.database.is_none());
    }

    #[test]
    fn malformed_override_is_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|name| (name == ENV_DEADLINE_MS).then(|| "soon".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_duplicate_and_synthesis_sources() {
        let endpoint = |source| SourceEndpoint {
            source,
            url: "http://localhost:1/x".to_string(),
        };
        let duplicate = AppConfig {
            sources: vec![endpoint(Source::Web), endpoint(Source::Web)],
            ..AppConfig::default()
        };
        assert!(duplicate.validate().is_err());

        let synthesis = AppConfig {
            sources: vec![endpoint(Source::Synthesis)],
            ..AppConfig::default()
        };
        assert!(synthesis.validate().is_err());
    }

    #[test]
    fn rejects_zero_deadline_and_bad_urls() {
        let mut config = AppConfig::default();
        config.orchestrator.deadline_ms = 0;
        assert!(config.validate().is_err());

        let config = AppConfig {
            synthesis: Some(SynthesisEndpoint {
                url: "ftp://nope".to_string(),
            }),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let temp = tempfile::tempdir().expect("temp dir");
        let result = AppConfig::from_file(&temp.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}

//! # Engine Primitives
//!
//! Compiled-in limits and default constants for the Tenderscope core.
//!
//! Values that operators tune (weights, thresholds, TTLs) have defaults here
//! but are carried at runtime by explicit configuration structs such as
//! [`crate::scoring::ScoringConfig`]. Input limits are fixed.

// =============================================================================
// SCORING DEFAULTS
// =============================================================================

/// Upper bound of the risk score scale.
pub const MAX_RISK_SCORE: u8 = 100;

/// Default severity weights: low, medium, high, critical.
pub const DEFAULT_SEVERITY_WEIGHTS: [f64; 4] = [2.0, 5.0, 10.0, 20.0];

/// Default multiplier applied to a corroborated finding's weight.
pub const DEFAULT_CORROBORATION_MULTIPLIER: f64 = 1.25;

/// Default lower bounds of the `low`, `medium`, `high` and `critical` levels.
/// Scores below the first bound are `minimal`.
pub const DEFAULT_LEVEL_THRESHOLDS: [u8; 4] = [10, 30, 55, 80];

/// Confidence assumed for a finding that does not carry its own.
pub const DEFAULT_FINDING_CONFIDENCE: f64 = 0.5;

/// Confidence of an investigation in which every answering source found nothing.
///
/// Non-zero: "checked and found nothing" still carries information.
pub const EMPTY_INVESTIGATION_CONFIDENCE: f64 = 0.3;

// =============================================================================
// INVESTIGATION DEFAULTS
// =============================================================================

/// Default time-to-live of a cached investigation result (6 hours).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 6 * 60 * 60;

/// Default shared deadline for one investigation fan-out.
pub const DEFAULT_INVESTIGATION_DEADLINE_MS: u64 = 20_000;

/// Findings accepted from a single source in one investigation.
///
/// Anything beyond this is dropped by the orchestrator so one noisy
/// collaborator cannot flood the merged list.
pub const MAX_FINDINGS_PER_SOURCE: usize = 200;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of an investigation subject key.
pub const MAX_SUBJECT_KEY_LENGTH: usize = 256;

/// Maximum length of short labels: titles, tender ids, roles, names.
pub const MAX_LABEL_LENGTH: usize = 256;

/// Maximum length of free text: descriptions, notes, tip bodies (64KB).
pub const MAX_TEXT_LENGTH: usize = 65536;

/// Maximum number of records returned by one listing call.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Clamp a requested listing size to `1..=MAX_LIST_LIMIT`.
/// `None` means the maximum.
#[must_use]
pub fn capped_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

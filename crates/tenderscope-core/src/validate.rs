//! Field validation shared by the case and tip aggregates.

use crate::EngineError;
use crate::primitives::{MAX_LABEL_LENGTH, MAX_TEXT_LENGTH};

/// Trimmed, non-empty short label.
pub(crate) fn label(field: &str, value: &str) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::InvalidInput(format!("{field} must not be empty")));
    }
    bounded(field, value, MAX_LABEL_LENGTH)?;
    if value.chars().any(char::is_control) {
        return Err(EngineError::InvalidInput(format!(
            "{field} contains control characters"
        )));
    }
    Ok(value.to_string())
}

/// Optional label; blank input means "none".
pub(crate) fn optional_label(field: &str, value: Option<&str>) -> Result<Option<String>, EngineError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => label(field, v).map(Some),
    }
}

/// Free text, trimmed. Empty text is allowed only when `required` is false.
pub(crate) fn text(field: &str, value: &str, required: bool) -> Result<String, EngineError> {
    let value = value.trim();
    if required && value.is_empty() {
        return Err(EngineError::InvalidInput(format!("{field} must not be empty")));
    }
    bounded(field, value, MAX_TEXT_LENGTH)?;
    Ok(value.to_string())
}

fn bounded(field: &str, value: &str, max: usize) -> Result<(), EngineError> {
    if value.len() > max {
        return Err(EngineError::InvalidInput(format!(
            "{field} length {} exceeds maximum {max} bytes",
            value.len()
        )));
    }
    Ok(())
}

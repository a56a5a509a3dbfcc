//! Request validation.

use std::sync::LazyLock;

use regex::Regex;

/// Keys the server answers for: word characters, dots and dashes.
static KEY_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+$"));

/// Validation error detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Human-readable error message.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Validation result type.
pub type ValidationResult<T = ()> = Result<T, ValidationError>;

/// Validate a key taken from a request path.
///
/// `.` and `..` are rejected so a key never names a directory.
///
/// # Errors
///
/// Returns an error when the key is empty or contains other characters.
pub fn validate_key(key: &str) -> ValidationResult {
    let pattern = KEY_PATTERN
        .as_ref()
        .map_err(|err| ValidationError::new(format!("Failed to compile key pattern: {err}")))?;

    if !pattern.is_match(key) || key == "." || key == ".." {
        return Err(ValidationError::new(format!("Invalid key: '{key}'")));
    }
    Ok(())
}

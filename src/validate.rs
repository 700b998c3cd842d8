use thiserror::Error;

/// A draft or patch that must not be sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} is too large ({size} bytes, limit is {limit})")]
    TooLarge {
        field: &'static str,
        size: u64,
        limit: u64,
    },
    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("nothing to update")]
    EmptyPatch,
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing(field));
    }
    Ok(())
}

/// Patch fields may be omitted, but not cleared.
pub(crate) fn require_if_present(
    field: &'static str,
    value: Option<&String>,
) -> Result<(), ValidationError> {
    match value {
        Some(value) => require(field, value),
        None => Ok(()),
    }
}

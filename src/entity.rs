//! Entity name validation.
//!
//! The entity name partitions all artifacts of a conversion run and becomes a
//! directory component under the output root, so it is validated up front and
//! rejected with an invocation error before any stage executes.

use thiserror::Error;

/// Maximum accepted entity name length in bytes.
pub const MAX_ENTITY_NAME_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntityNameError {
    #[error("entity name is empty")]
    Empty,

    #[error("entity name is {len} bytes (maximum {MAX_ENTITY_NAME_LEN})")]
    TooLong { len: usize },

    #[error("entity name contains invalid character '{ch}' (allowed: A-Z a-z 0-9 _ -)")]
    InvalidChar { ch: char },

    #[error("entity name must start with an alphanumeric character")]
    InvalidLeadingChar,
}

/// Validate an entity name supplied by the invoker.
///
/// Names become a single path component; the character set is restricted so
/// the name can never carry traversal sequences or separators.
pub fn validate_entity_name(raw: &str) -> Result<(), EntityNameError> {
    if raw.is_empty() {
        return Err(EntityNameError::Empty);
    }
    if raw.len() > MAX_ENTITY_NAME_LEN {
        return Err(EntityNameError::TooLong { len: raw.len() });
    }
    for ch in raw.chars() {
        if !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
            return Err(EntityNameError::InvalidChar { ch });
        }
    }
    let first = raw.chars().next().ok_or(EntityNameError::Empty)?;
    if !first.is_ascii_alphanumeric() {
        return Err(EntityNameError::InvalidLeadingChar);
    }
    Ok(())
}

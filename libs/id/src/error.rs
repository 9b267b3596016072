//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID contains whitespace or control characters.
    #[error("invalid character in '{value}'")]
    InvalidCharacter { value: String },

    /// The digest algorithm prefix is present but the hex part is missing.
    #[error("digest '{value}' has no hex part")]
    MissingDigest { value: String },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}

//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Rejection of a single input value.
///
/// Callers decide whether a rejection is fatal (configuration) or becomes a
/// diagnostic (a bad source row or baseline line).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Unparseable count, date or other field.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Blank or malformed identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Two entries claim different values for the same key.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_offending_value() {
        let err = DomainError::validation("'Widget': invalid physical_count 'abc'");
        assert_eq!(err.to_string(), "validation failed: 'Widget': invalid physical_count 'abc'");
        assert_eq!(DomainError::invalid_id("blank").to_string(), "invalid identifier: blank");
    }
}

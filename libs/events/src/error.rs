//! Error types for notification translation.

use thiserror::Error;

/// Errors raised while reading a pod snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// A field exists but has an unexpected JSON type.
    #[error("field {path} is {found}, expected {expected}")]
    UnexpectedType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A required field is missing.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

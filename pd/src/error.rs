//! Error types for plugdeps operations

use thiserror::Error;

/// Errors raised synchronously by plugdeps operations.
///
/// Git process failures are never reported through this type: they live on
/// the per-plugin [`Job`](crate::runner::Job) and surface in reports.
#[derive(Debug, Error)]
pub enum DepsError {
    #[error("`{field}` should be {expected}")]
    InvalidField { field: String, expected: String },

    #[error("Plugin `{0}` is not present on disk and has no `source` to install from")]
    MissingSource(String),

    #[error("`{0}` is not a name of a plugin from the session")]
    UnknownPlugin(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Confirmation failed: {0}")]
    Confirm(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DepsError {
    /// Build a field-qualified validation error
    pub fn invalid(field: impl Into<String>, expected: impl Into<String>) -> Self {
        DepsError::InvalidField {
            field: field.into(),
            expected: expected.into(),
        }
    }

    /// Check if this is a validation error (bad spec or config shape)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DepsError::InvalidField { .. } | DepsError::MissingSource(_) | DepsError::UnknownPlugin(_)
        )
    }
}

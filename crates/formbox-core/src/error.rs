//! Formbox error types.

use std::collections::BTreeMap;

/// Convenience result alias used across the workspace.
pub type Result<T> = std::result::Result<T, FormboxError>;

/// All errors that can occur in Formbox.
#[derive(Debug, thiserror::Error)]
pub enum FormboxError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation failed: {}", format_field_errors(.0))]
    Validation(BTreeMap<String, String>),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown form: {0}")]
    UnknownForm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_field_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, msg)| format!("{field}: {msg}"))
        .collect::<Vec<_>>()
        .join("; ")
}

use std::{path::PathBuf, time::Duration};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TasklineError>;

#[derive(Debug, Error)]
pub enum TasklineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence failure during {operation} on {}: {source}", path.display())]
    Persistence {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "sqlite-storage")]
    #[error("Database failure during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Ticket not found in {repository} repository: {id}")]
    TicketNotFound { repository: &'static str, id: String },

    #[error("Malformed persistence data in field '{field}' (record {})", id.as_deref().unwrap_or("unknown"))]
    MalformedData { field: String, id: Option<String> },

    #[error("Domain reconstruction failed for record {id} during {operation} ({summary}): {source}")]
    DomainReconstruction {
        id: String,
        operation: &'static str,
        summary: String,
        #[source]
        source: DomainError,
    },

    #[error("All {count} records failed conversion during {operation}")]
    AllRecordsInvalid { operation: &'static str, count: usize },

    #[error("Alias '{alias}' is already used by ticket {owner}")]
    AliasConflict { alias: String, owner: String },

    #[error("Invalid ticket ID format: {0}")]
    InvalidTicketId(String),

    #[error("Alias length must be between {min} and {max}, got {length}")]
    InvalidAliasLength { length: usize, min: usize, max: usize },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Identifier generation failed: {0}")]
    GenerationFailed(String),

    #[error("Operation '{operation}' is not supported by the {backend} backend")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskJoin(String),
}

/// Validation failures raised by the domain model itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("Title is {length} characters, maximum is {max}")]
    TitleTooLong { length: usize, max: usize },

    #[error("Description is {length} characters, maximum is {max}")]
    DescriptionTooLong { length: usize, max: usize },

    #[error("Invalid ticket identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Invalid {field} value: '{value}'")]
    InvalidEnumValue { field: &'static str, value: String },

    #[error("Invalid alias '{alias}': {reason}")]
    InvalidAlias { alias: String, reason: String },

    #[error("Duplicate alias '{0}' on the same ticket")]
    DuplicateAlias(String),

    #[error("Alias '{0}' not found on ticket")]
    AliasNotFound(String),

    #[error("Updated timestamp {updated_at} precedes creation timestamp {created_at}")]
    TimestampOrder {
        created_at: String,
        updated_at: String,
    },
}

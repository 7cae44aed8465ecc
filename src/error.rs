use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Central error type for collaborator failures (storage, catalog, hashing)
///
/// Steps never hand these to the executor. They are converted into a
/// failed `StepResult` carrying a [`StepError`] at the step boundary.
#[derive(Error, Debug)]
pub enum UploadError {
    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    // ============================================================================
    // Catalog Errors
    // ============================================================================
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ============================================================================
    // Hashing Errors
    // ============================================================================
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    #[error("Failed to calculate hash: {0}")]
    HashingFailed(String),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown disk: {0}")]
    UnknownDisk(String),

    #[error("Step factory '{name}' failed: {reason}")]
    StepFactoryFailed { name: String, reason: String },

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mutex lock error")]
    LockError,

    #[error("Internal error: {0}")]
    Internal(String),
}

// Implement conversion from PoisonError for Mutex locks
impl<T> From<std::sync::PoisonError<T>> for UploadError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        UploadError::LockError
    }
}

// Helper type alias for Results
pub type UploadResult<T> = Result<T, UploadError>;

/// Structured diagnostic carried in a failed step result
///
/// These are surfaced verbatim to the caller, so their messages are written
/// for an end user and never include internal detail beyond the cause text.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
    #[error("{message}")]
    Validation { message: String },

    #[error("Duplicate of existing file '{filename}' ({record_id})")]
    DuplicateDetected {
        record_id: Uuid,
        filename: String,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Catalog error: {message}")]
    Catalog { message: String },

    #[error("Missing required file information: {}", keys.join(", "))]
    MissingMetadata { keys: Vec<String> },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Hash computation failed: {message}")]
    Hashing { message: String },
}

impl StepError {
    pub fn validation(message: impl Into<String>) -> Self {
        StepError::Validation {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        StepError::Storage {
            message: message.into(),
        }
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        StepError::Catalog {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        StepError::Configuration {
            message: message.into(),
        }
    }

    pub fn hashing(message: impl Into<String>) -> Self {
        StepError::Hashing {
            message: message.into(),
        }
    }

    /// Short machine-readable kind, matching the serialized `kind` tag
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Validation { .. } => "validation",
            StepError::DuplicateDetected { .. } => "duplicate_detected",
            StepError::Storage { .. } => "storage",
            StepError::Catalog { .. } => "catalog",
            StepError::MissingMetadata { .. } => "missing_metadata",
            StepError::Configuration { .. } => "configuration",
            StepError::Hashing { .. } => "hashing",
        }
    }
}

//! Error types for Larder.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 4=validation, 5=safety, 6=repository, etc.)
//! - Retryability flags for the publish run loop
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Larder operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,

    // Validation (exit 4)
    InvalidHash,
    InvalidBranchName,
    PathOutsideRoot,
    InvalidArgument,

    // Safety guards (exit 5)
    IntegrityViolation,
    UnsafeExport,

    // Repository (exit 6)
    RepositoryError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Collaborators (exit 9)
    CollaboratorError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::InvalidHash => "INVALID_HASH",
            Self::InvalidBranchName => "INVALID_BRANCH_NAME",
            Self::PathOutsideRoot => "PATH_OUTSIDE_ROOT",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::IntegrityViolation => "INTEGRITY_VIOLATION",
            Self::UnsafeExport => "UNSAFE_EXPORT",
            Self::RepositoryError => "REPOSITORY_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::CollaboratorError => "COLLABORATOR_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError => 2,
            Self::InvalidHash
            | Self::InvalidBranchName
            | Self::PathOutsideRoot
            | Self::InvalidArgument => 4,
            Self::IntegrityViolation | Self::UnsafeExport => 5,
            Self::RepositoryError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::CollaboratorError => 9,
        }
    }

    /// Whether the failed operation may succeed when retried unchanged.
    ///
    /// True for repository, database and collaborator failures, which the
    /// run loop retries at cycle granularity. Validation and safety-guard
    /// failures need a human to look at them first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RepositoryError
                | Self::DatabaseError
                | Self::CollaboratorError
                | Self::IoError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Larder operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid hash: {hash:?} (expected 64 lowercase hex characters)")]
    InvalidHash { hash: String },

    #[error(
        "Integrity violation: content store shrank from {before} to {after} items during repository update"
    )]
    IntegrityViolation { before: u64, after: u64 },

    #[error("Unsafe export refused: {0}")]
    UnsafeExport(String),

    #[error("Git {operation} failed: {message}")]
    RepositoryOperation { operation: String, message: String },

    #[error("Collaborator unavailable: {0}")]
    TransientCollaborator(String),

    #[error("Invalid branch name: {0:?}")]
    InvalidBranchName(String),

    #[error("Path {} is outside {}", path.display(), root.display())]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a failed git invocation.
    pub fn repository(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RepositoryOperation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidHash { .. } => ErrorCode::InvalidHash,
            Self::IntegrityViolation { .. } => ErrorCode::IntegrityViolation,
            Self::UnsafeExport(_) => ErrorCode::UnsafeExport,
            Self::RepositoryOperation { .. } => ErrorCode::RepositoryError,
            Self::TransientCollaborator(_) => ErrorCode::CollaboratorError,
            Self::InvalidBranchName(_) => ErrorCode::InvalidBranchName,
            Self::PathOutsideRoot { .. } => ErrorCode::PathOutsideRoot,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for operators.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::InvalidHash { .. } => Some(
                "Hashes are SHA-256 digests in lowercase hex. Use `larder store put` to obtain one."
                    .to_string(),
            ),

            Self::IntegrityViolation { before, after } => Some(format!(
                "The repository update removed {} content store items. \
                 Inspect the repository working tree and `git log` before the next cycle.",
                before.saturating_sub(*after)
            )),

            Self::UnsafeExport(_) => Some(
                "The live record count fell below the ratchet. Verify the database, \
                 or set LARDER_ALLOW_RATCHET_OVERRIDE=1 for a deliberate shrink."
                    .to_string(),
            ),

            Self::RepositoryOperation { operation, .. } if operation == "clone" => Some(
                "Check `repo.url` and LARDER_GIT_TOKEN, and that the target directory is writable."
                    .to_string(),
            ),

            Self::Config(_) => Some(
                "Configuration is read from --config, LARDER_CONFIG or ~/.larder/config.json."
                    .to_string(),
            ),

            Self::RepositoryOperation { .. }
            | Self::TransientCollaborator(_)
            | Self::InvalidBranchName(_)
            | Self::PathOutsideRoot { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

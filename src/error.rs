//! Error types for mirror-leech
//!
//! Failures are grouped by where they send a task:
//! - [`ResolutionError`] and [`BackendError`] end a task through the download-error path
//! - [`ProcessingError`] ends a task through the upload-error path
//! - [`NotifyError`] is logged where it happens and never ends a task

use crate::types::Button;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mirror-leech operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mirror-leech
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error
        key: Option<String>,
    },

    /// A link could not be turned into a fetchable resource
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A download or upload backend reported failure
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Extraction or media filtering failed
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// A status message could not be sent, edited or deleted
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task not found in the live registry
    #[error("task not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,
}

/// Where a failed task is routed for teardown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureRoute {
    /// Download-error entry point
    Download,
    /// Upload-error entry point
    Upload,
    /// Logged at the call site; the task continues
    LogOnly,
}

impl Error {
    /// Teardown route for this error
    pub fn route(&self) -> FailureRoute {
        match self {
            Error::Backend(BackendError::Upload(_)) => FailureRoute::Upload,
            Error::Resolution(_) | Error::Backend(_) => FailureRoute::Download,
            Error::Processing(_) => FailureRoute::Upload,
            Error::Notify(_) => FailureRoute::LogOnly,
            // Raised after the download was handed over.
            _ => FailureRoute::Upload,
        }
    }
}

/// A link could not be unwrapped into a direct resource
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ResolutionError {
    /// Message reported to the task originator
    pub message: String,
    /// Whether the message is a directive meant for the user (e.g. "password required")
    pub user_facing: bool,
}

impl ResolutionError {
    /// Prefix the link unwrappers use for directives addressed to the user
    pub const USER_FACING_PREFIX: &'static str = "ERROR:";

    /// Create a resolution error, classifying it by its message prefix
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let user_facing = message.starts_with(Self::USER_FACING_PREFIX);
        Self {
            message,
            user_facing,
        }
    }

    /// Whether the message is worth logging (password prompts are expected noise)
    pub fn should_log(&self) -> bool {
        !self.message.contains("This link requires a password!")
    }
}

/// Download or upload backend failures
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend reported an error for the transfer
    #[error("{message}")]
    Reported {
        /// Error text from the backend
        message: String,
        /// Optional action button for the originator
        hint: Option<Button>,
    },

    /// The backend dropped its reporter without a terminal signal
    #[error("{backend} backend stopped without reporting a result")]
    Abandoned {
        /// Backend name
        backend: String,
    },

    /// No backend is registered for the resolved source kind
    #[error("no backend registered for {0} sources")]
    Unavailable(String),

    /// Upload backend failure
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Post-download processing failures
#[derive(Debug, Clone, Error)]
pub enum ProcessingError {
    /// Archive extraction failed
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed {
        /// The archive that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// A directory download contained no video files
    #[error("No video files found in the extracted folder.")]
    NoVideoFiles {
        /// The directory that was searched
        path: PathBuf,
    },

    /// The media-stream filter failed
    #[error("media processing failed for {path}: {reason}")]
    MediaFilter {
        /// The file being processed
        path: PathBuf,
        /// The reason processing failed
        reason: String,
    },

    /// The part counter was used inconsistently
    #[error("invalid part state: {0}")]
    Parts(String),
}

/// Messaging sink failures
#[derive(Debug, Clone, Error)]
#[error("failed to {operation} message: {reason}")]
pub struct NotifyError {
    /// The operation that failed ("send", "edit", "delete", "refresh")
    pub operation: &'static str,
    /// The reason reported by the sink
    pub reason: String,
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

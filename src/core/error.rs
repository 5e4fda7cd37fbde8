//! Application-wide error types.
//!
//! - [`AppError`] — startup and server lifecycle failures (fatal to the process).
//! - [`IdentifyError`] — outcome of a single consolidation request.
//! - [`StoreError`] — anything the persistence layer reports.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a contact store backend.
///
/// Lock timeouts and write conflicts surface here too; the core never retries.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e.0)
    }
}

/// Tagged failure of an identify request.
#[derive(Debug, Error)]
pub enum IdentifyError {
    /// Caller supplied neither an email nor a phone number.
    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The link graph is not in the shape the consolidation relies on.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl IdentifyError {
    /// `true` for failures caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, IdentifyError::Validation(_))
    }
}

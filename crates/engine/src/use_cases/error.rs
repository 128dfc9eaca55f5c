//! Stable error kinds surfaced to callers.
//!
//! Every use-case error exposes `kind()` and `reason()`; the HTTP layer maps
//! the kind to a status code and echoes the reason in the error body.

use crate::infrastructure::ports::{QueueError, RepoError, ScanError};
use crate::use_cases::context::{AccessError, Interrupted};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Unprocessable,
    Unauthorized,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn of_repo(err: &RepoError) -> Self {
        match err {
            RepoError::NotFound { .. } => Self::NotFound,
            RepoError::Busy { .. } | RepoError::ConstraintViolation(_) => Self::Conflict,
            RepoError::Database { .. } | RepoError::Serialization(_) => Self::Internal,
        }
    }

    pub fn of_access(err: &AccessError) -> Self {
        match err {
            AccessError::NotVisible(_) => Self::NotFound,
            AccessError::Forbidden { .. } => Self::Forbidden,
        }
    }
}

pub(crate) fn repo_reason(err: &RepoError) -> &'static str {
    match err {
        RepoError::NotFound { .. } => "NotFound",
        RepoError::Busy { .. } => "Busy",
        RepoError::ConstraintViolation(_) => "Conflict",
        RepoError::Database { .. } | RepoError::Serialization(_) => "Internal",
    }
}

pub(crate) fn access_reason(err: &AccessError) -> &'static str {
    match err {
        AccessError::NotVisible(_) => "NotFound",
        AccessError::Forbidden { .. } => "Forbidden",
    }
}

pub(crate) fn interrupted_scan(interrupted: Interrupted) -> ScanError {
    match interrupted {
        Interrupted::TimedOut(limit) => ScanError::Timeout(limit.as_secs()),
        Interrupted::Cancelled => ScanError::Cancelled,
    }
}

/// Errors common to the background workers.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("{0}")]
    Failed(String),
}

//! Error types for port operations.

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Entity not found, or not visible to the caller.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// A row or advisory lock is held by another transaction.
    #[error("{entity_type} {id} is locked by another operation")]
    Busy {
        entity_type: &'static str,
        id: String,
    },

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Business constraint violated.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepoError {
    /// Create a NotFound error with entity type and ID context.
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a Busy error for a contended lock.
    pub fn busy(entity_type: &'static str, id: impl ToString) -> Self {
        Self::Busy {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Create a ConstraintViolation error.
    pub fn constraint(message: impl ToString) -> Self {
        Self::ConstraintViolation(message.to_string())
    }

    /// Check if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a lock contention error.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

impl From<playbymail_domain::DomainError> for RepoError {
    /// Stored rows that fail re-validation on load.
    fn from(err: playbymail_domain::DomainError) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue error: {0}")]
    Error(String),
}

impl QueueError {
    pub fn new(message: impl ToString) -> Self {
        Self::Error(message.to_string())
    }
}

/// Failures of the vision service and of the scanners built on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    /// The image could not be read as the expected sheet.
    #[error("Scan failed: {0}")]
    Failed(String),
    /// The vision call exceeded its deadline.
    #[error("Scan timed out after {0}s")]
    Timeout(u64),
    /// The caller's request was cancelled while scanning.
    #[error("Scan cancelled")]
    Cancelled,
    /// The vision service could not be reached.
    #[error("Vision service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("Render failed: {0}")]
    Failed(String),
    #[error("Render timed out after {0}s")]
    Timeout(u64),
    #[error("Render cancelled")]
    Cancelled,
    #[error("Renderer unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("Account directory request failed: {0}")]
    RequestFailed(String),
}

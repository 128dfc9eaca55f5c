//! Errors raised by domain rules.
//!
//! The engine maps these onto its own error kinds; the domain never decides
//! status codes.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// A value failed its own rules (empty name, chance outside [0, 1], ...).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced row is missing from the world being checked.
    #[error("{entity_type} {id} not found")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Rows are individually valid but disagree with each other.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Stored or wire text did not parse into a domain value.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An instance or sheet was asked to move to a state it cannot reach.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// `from -> to` style message, e.g. `"cancelled -> started"`.
    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidStateTransition(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_the_row() {
        let err = DomainError::not_found("Location", "123e4567-e89b-12d3-a456-426614174000");
        assert_eq!(
            err.to_string(),
            "Location 123e4567-e89b-12d3-a456-426614174000 not found"
        );
    }

    #[test]
    fn test_only_transition_errors_are_transitions() {
        assert!(DomainError::invalid_state_transition("cancelled -> started").is_invalid_transition());
        assert!(!DomainError::constraint("link crosses games").is_invalid_transition());
        assert!(!DomainError::validation("empty name").is_invalid_transition());
    }
}

//! Unified error types for the domain layer
//!
//! Provides a common error type that can be used across all domain operations,
//! enabling consistent error handling without forcing adapters to use String or anyhow.

use thiserror::Error;

use crate::entities::PanelSide;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Business rule violation
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The target panel slot already holds an image
    #[error("Slot {side}:{index} is already occupied")]
    SlotOccupied { side: PanelSide, index: usize },

    /// The slot index is outside the panel capacity
    #[error("Slot {side}:{index} is out of range (capacity {capacity})")]
    SlotOutOfRange {
        side: PanelSide,
        index: usize,
        capacity: usize,
    },
}

impl DomainError {
    /// Creates a validation error for business rule violations.
    ///
    /// # Example
    /// ```ignore
    /// if prompts.is_empty() {
    ///     return Err(DomainError::validation("A batch needs at least one prompt"));
    /// }
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

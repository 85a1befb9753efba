//! Error types for port operations.

/// Storage operation errors with context for debugging.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepoError {
    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// The store's owning task is gone.
    #[error("Store closed")]
    Closed,
}

impl RepoError {
    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageGenError {
    /// The provider answered and refused the request.
    #[error("Provider rejected request: {0}")]
    Rejected(String),
    /// The request never got a usable answer (connect, timeout, 5xx).
    #[error("Provider request failed: {0}")]
    Request(String),
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("Service unavailable")]
    Unavailable,
}

impl ImageGenError {
    /// Whether a poll should count this as an attempt and keep going.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Unavailable)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("Sync request failed: {0}")]
    Request(String),
    #[error("Sync endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

use serde::{Deserialize, Serialize};

/// Main error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed invocation, rejected before any task exists.
    #[error("Validation error: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// The named capability is not registered. The task is created and then
    /// immediately failed so callers can still poll or subscribe.
    #[error("Capability not found: {capability}")]
    CapabilityNotFound { capability: String },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// Rejected state transition, e.g. continuing a terminal task.
    #[error("Invalid task state transition for {task_id}: {from} -> {to}")]
    InvalidTaskTransition {
        task_id: String,
        from: String,
        to: String,
    },

    /// Domain error returned by a capability handler.
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Internal error: {component}: {reason}")]
    Internal { component: String, reason: String },
}

impl EngineError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// The stable domain-error shape capability handlers return instead of
/// throwing: a machine-readable code, a human-readable message, and the
/// offending field when one can be named.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct HandlerError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl HandlerError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Serialization {
            reason: error.to_string(),
        }
    }
}

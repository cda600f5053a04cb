//! Error types for queue operations and message handlers.

use crate::error_type::{self, ErrorType};
use crate::message::{MessageHeaders, MessageId};
use std::fmt;
use thiserror::Error;

/// Comprehensive error type for all engine and transport operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{component} has already been started")]
    AlreadyStarted { component: String },

    #[error("{component} has been disposed")]
    Disposed { component: String },

    #[error("{component} has not been started")]
    NotStarted { component: String },

    #[error("Work group '{group}' queue is full (max: {max_queue_size})")]
    WorkGroupQueueFull { group: String, max_queue_size: usize },

    #[error("Poison message {message_id}: {reason}")]
    PoisonMessage {
        message_id: MessageId,
        headers: MessageHeaders,
        reason: String,
    },

    #[error("Transport operation '{operation}' failed: {message}")]
    Transport { operation: String, message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and the operation may succeed when repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AlreadyStarted { .. } => false,
            Self::Disposed { .. } => false,
            Self::NotStarted { .. } => false,
            Self::WorkGroupQueueFull { .. } => true,
            Self::PoisonMessage { .. } => false,
            Self::Transport { .. } => true,
            Self::Serialization(_) => false,
            Self::Configuration(_) => false,
            Self::Validation(_) => false,
        }
    }

    /// Shorthand for building a transport failure
    pub fn transport(operation: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn disposed(component: &str) -> Self {
        Self::Disposed {
            component: component.to_string(),
        }
    }

    pub(crate) fn already_started(component: &str) -> Self {
        Self::AlreadyStarted {
            component: component.to_string(),
        }
    }
}

/// Errors during message serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration section '{section}' is read-only")]
    ReadOnly { section: String },

    #[error("Retry delays already registered for error type '{error_type}'")]
    DuplicateRetryType { error_type: String },

    #[error("Work group '{name}' already exists with different settings")]
    WorkGroupConflict { name: String },

    #[error("Unknown error type '{name}'")]
    UnknownErrorType { name: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

// ============================================================================
// Handler Errors
// ============================================================================

/// Failure raised by a user message handler.
///
/// Every handler error is classified by an [`ErrorType`]. The retry delay
/// registry resolves retry schedules from this classification, walking the
/// type's ancestors until a registered entry is found.
#[derive(Debug, Error)]
#[error("{error_type}: {message}")]
pub struct HandlerError {
    error_type: &'static ErrorType,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Create a handler error with the given classification
    pub fn new(error_type: &'static ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary error, classifying it as `error_type`
    pub fn from_error<E>(error_type: &'static ErrorType, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            error_type,
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Classification of this failure
    pub fn error_type(&self) -> &'static ErrorType {
        self.error_type
    }

    /// Human readable failure description
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl HandlerError {
    pub(crate) fn from_panic(panic: HandlerPanic) -> Self {
        HandlerError::new(&error_type::EXCEPTION, panic.0)
    }
}

/// Raised when a message cannot be decoded or dispatched to a handler at all.
#[derive(Debug, Error)]
#[error("Poison message: {reason}")]
pub struct PoisonMessageError {
    reason: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PoisonMessageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            reason: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Outcome of a failed handler invocation
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The handler ran and failed; subject to retry classification
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The message could not be processed at all
    #[error(transparent)]
    Poison(#[from] PoisonMessageError),
}

impl From<SerializationError> for ProcessingError {
    fn from(error: SerializationError) -> Self {
        Self::Poison(PoisonMessageError::from_error(error))
    }
}

/// Text extracted from a handler task that panicked or was cancelled
#[derive(Debug)]
pub(crate) struct HandlerPanic(pub String);

impl HandlerPanic {
    pub(crate) fn from_join_error(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            return Self("handler task was cancelled".to_string());
        }
        let payload = error.into_panic();
        let text = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self(text)
    }
}

impl fmt::Display for HandlerPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

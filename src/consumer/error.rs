//! Consumer error types

use crate::core::error_handling::ContextualError;

/// Listener registration and lifecycle failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("A listener is already registered for {url}")]
    DuplicateListener { url: String },

    #[error("Listener for {url} has max batch {max_batch}; it must be between 1 and 10")]
    InvalidBatchSize { url: String, max_batch: usize },

    #[error("Configuration property '{property}' naming a listener queue is not set")]
    MissingProperty { property: String },

    #[error("Listener orchestrator has already been started")]
    AlreadyStarted,
}

impl ContextualError for ListenerError {
    fn is_user_actionable(&self) -> bool {
        !matches!(self, ListenerError::AlreadyStarted)
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

pub type ListenerResult<T> = Result<T, ListenerError>;

/// Failure reported by a message handler
///
/// The dispatcher logs it and treats the message as having no reply; the
/// message is still acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("Malformed message body: {}", e))
    }
}

//! Transport Error Types

use crate::core::error_handling::ContextualError;

/// Failures raised at the queue transport boundary
///
/// Every variant carries the queue it concerns (a URL, or a name for
/// queue-level operations) and the cause reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to send message to {queue}: {cause}")]
    Send { queue: String, cause: String },

    #[error("Failed to poll messages from {queue}: {cause}")]
    Poll { queue: String, cause: String },

    #[error("Failed to acknowledge message on {queue}: {cause}")]
    Ack { queue: String, cause: String },

    #[error("Failed to create queue {queue}: {cause}")]
    QueueCreation { queue: String, cause: String },

    #[error("Failed to delete queue {queue}: {cause}")]
    QueueRemoval { queue: String, cause: String },

    #[error("Failed to look up queue {queue}: {cause}")]
    QueueLookup { queue: String, cause: String },

    #[error("Unknown queue provider '{provider}' (available: {})", available.join(", "))]
    UnknownProvider {
        provider: String,
        available: Vec<String>,
    },
}

impl TransportError {
    pub fn send(queue: impl Into<String>, cause: impl ToString) -> Self {
        TransportError::Send {
            queue: queue.into(),
            cause: cause.to_string(),
        }
    }

    pub fn poll(queue: impl Into<String>, cause: impl ToString) -> Self {
        TransportError::Poll {
            queue: queue.into(),
            cause: cause.to_string(),
        }
    }

    pub fn ack(queue: impl Into<String>, cause: impl ToString) -> Self {
        TransportError::Ack {
            queue: queue.into(),
            cause: cause.to_string(),
        }
    }

    pub fn queue_creation(queue: impl Into<String>, cause: impl ToString) -> Self {
        TransportError::QueueCreation {
            queue: queue.into(),
            cause: cause.to_string(),
        }
    }

    pub fn queue_removal(queue: impl Into<String>, cause: impl ToString) -> Self {
        TransportError::QueueRemoval {
            queue: queue.into(),
            cause: cause.to_string(),
        }
    }

    pub fn queue_lookup(queue: impl Into<String>, cause: impl ToString) -> Self {
        TransportError::QueueLookup {
            queue: queue.into(),
            cause: cause.to_string(),
        }
    }

    /// The queue URL or name this error refers to, if any
    pub fn queue(&self) -> Option<&str> {
        match self {
            TransportError::Send { queue, .. }
            | TransportError::Poll { queue, .. }
            | TransportError::Ack { queue, .. }
            | TransportError::QueueCreation { queue, .. }
            | TransportError::QueueRemoval { queue, .. }
            | TransportError::QueueLookup { queue, .. } => Some(queue),
            TransportError::UnknownProvider { .. } => None,
        }
    }
}

impl ContextualError for TransportError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, TransportError::UnknownProvider { .. })
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

//! Producer error types

use crate::core::error_handling::ContextualError;
use crate::producer::token::CorrelationToken;
use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The response queue was never created, or did not appear in time
    #[error("No response queue is available for two-way requests")]
    NoResponseQueue,

    /// A correlation token was registered twice
    #[error("Correlation token {token} is already awaiting a reply")]
    DuplicateToken { token: CorrelationToken },

    #[error("Response broker has been shut down")]
    ShutDown,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ContextualError for BrokerError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<String> {
        None
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

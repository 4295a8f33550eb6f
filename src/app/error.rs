//! Application-level errors

use crate::consumer::ListenerError;
use crate::core::config::ConfigError;
use crate::core::error_handling::ContextualError;
use crate::core::logging::LoggingError;
use crate::demo::ClientError;
use crate::producer::BrokerError;
use crate::transport::TransportError;

/// Anything that can end a `qrelay` command
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub type AppResult<T> = Result<T, AppError>;

impl ContextualError for AppError {
    fn is_user_actionable(&self) -> bool {
        match self {
            AppError::Config(e) => e.is_user_actionable(),
            AppError::Logging(e) => matches!(e, LoggingError::UnknownFormat(_)),
            AppError::Transport(e) => e.is_user_actionable(),
            AppError::Broker(e) => e.is_user_actionable(),
            AppError::Listener(e) => e.is_user_actionable(),
            AppError::Client(e) => e.is_user_actionable(),
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Logging(_) => self.is_user_actionable().then(|| self.to_string()),
            AppError::Transport(e) => e.user_message(),
            AppError::Broker(e) => e.user_message(),
            AppError::Listener(e) => e.user_message(),
            AppError::Client(e) => e.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_property_is_reported_verbatim() {
        let error = AppError::from(ListenerError::MissingProperty {
            property: "twoways.queue.url".to_string(),
        });

        assert!(error.is_user_actionable());
        assert_eq!(error.user_message(), Some(error.to_string()));
    }

    #[test]
    fn test_transport_failures_are_not_user_actionable() {
        let error = AppError::from(TransportError::send("memory://queues/x", "connection reset"));

        assert!(!error.is_user_actionable());
        assert_eq!(error.user_message(), None);
    }

    #[test]
    fn test_unknown_log_format_is_user_actionable() {
        let error = AppError::from(LoggingError::UnknownFormat("xml".to_string()));
        assert!(error.is_user_actionable());
    }
}

//! Top-level error reporting
//!
//! Errors that reach the binary's entry point are logged through
//! [`log_error_with_context`]: configuration mistakes and other problems the
//! operator can fix are shown verbatim, while infrastructure failures are
//! reported against the operation that failed with the detail at debug level.

/// Errors that know whether the operator can act on them
///
/// When `is_user_actionable()` is true, `user_message()` should return
/// `Some(message)`; otherwise it should return `None`.
pub trait ContextualError: std::error::Error {
    /// True when the error message itself tells the operator what to fix
    fn is_user_actionable(&self) -> bool;

    /// The message to show when the error is user-actionable
    fn user_message(&self) -> Option<String>;
}

/// Log a fatal error at the detail level its kind calls for
///
/// # Examples
/// ```rust,no_run
/// use qrelay::core::config::Settings;
/// use qrelay::core::error_handling::log_error_with_context;
///
/// # async fn example() {
/// if let Err(e) = Settings::load(Some("missing.toml".as_ref())).await {
///     // Logs: "FATAL: The specified configuration file does not exist: missing.toml"
///     log_error_with_context(&e, "Loading configuration");
/// }
/// # }
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(message) if error.is_user_actionable() => log::error!("FATAL: {}", message),
        _ => log::error!("FATAL: {} failed: {}", operation_context, error),
    }
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ListenerError;
    use crate::core::config::ConfigError;
    use crate::producer::BrokerError;

    #[test]
    fn test_config_errors_are_user_actionable() {
        let error = ConfigError::InvalidValue {
            key: "broker.reply_timeout_secs".to_string(),
            message: "expected an integer, found string".to_string(),
        };

        assert!(error.is_user_actionable());
        assert_eq!(
            error.user_message().as_deref(),
            Some("Invalid value for 'broker.reply_timeout_secs': expected an integer, found string")
        );
    }

    #[test]
    fn test_listener_registration_errors_are_user_actionable() {
        let error = ListenerError::MissingProperty {
            property: "twoways.queue.url".to_string(),
        };

        assert!(error.is_user_actionable());
        assert!(error.user_message().unwrap().contains("twoways.queue.url"));
    }

    #[test]
    fn test_broker_failures_are_system_errors() {
        let error = BrokerError::NoResponseQueue;

        assert!(!error.is_user_actionable());
        assert_eq!(error.user_message(), None);
    }
}

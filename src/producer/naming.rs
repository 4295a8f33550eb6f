//! Response queue naming
//!
//! Queue names have the form `<application>_RQ_TEMP_<uuid>`. Queue services
//! cap names at 80 characters drawn from `[A-Za-z0-9_-]`, so the application
//! prefix is sanitised and truncated to fit alongside the fixed-width suffix.

use uuid::Uuid;

/// Application name used when none is configured
pub const DEFAULT_APPLICATION_NAME: &str = "TEST";

/// Separator between the application prefix and the queue's UUID
pub const RESPONSE_QUEUE_MARKER: &str = "_RQ_TEMP_";

/// Longest queue name the transport accepts
pub const MAX_QUEUE_NAME_LEN: usize = 80;

const UUID_LEN: usize = 36;

/// Longest application prefix that still fits: 80 - 9 - 36
pub const MAX_PREFIX_LEN: usize = MAX_QUEUE_NAME_LEN - RESPONSE_QUEUE_MARKER.len() - UUID_LEN;

/// Replace disallowed characters with `_` and cut to [`MAX_PREFIX_LEN`]
pub fn sanitize_application_name(application_name: &str) -> String {
    let cleaned: String = application_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_PREFIX_LEN)
        .collect();
    if cleaned.is_empty() {
        DEFAULT_APPLICATION_NAME.to_string()
    } else {
        cleaned
    }
}

/// Fresh response queue name for `application_name`
pub fn response_queue_name(application_name: &str) -> String {
    format!(
        "{}{}{}",
        sanitize_application_name(application_name),
        RESPONSE_QUEUE_MARKER,
        Uuid::new_v4()
    )
}

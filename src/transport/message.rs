//! Message envelope shared by every transport
//!
//! A [`QueueMessage`] is what the transport hands back from a receive: the
//! opaque body, the receipt handle needed to acknowledge it, and the string
//! attributes that travelled with it. Two attribute keys are reserved for the
//! request/response path; all others pass through untouched.

use std::collections::HashMap;

/// Attribute carrying the correlation token of a two-way request
pub const SIGNATURE_ATTRIBUTE: &str = "Signature";

/// Attribute carrying the URL of the producer's response queue
pub const RESPONSE_QUEUE_URL_ATTRIBUTE: &str = "ResponseQueueUrl";

/// String attributes attached to a message, keyed by attribute name
pub type MessageAttributes = HashMap<String, String>;

/// A message as received from a queue
///
/// # Example
///
/// ```rust
/// use qrelay::transport::{QueueMessage, SIGNATURE_ATTRIBUTE};
///
/// let message = QueueMessage::new("{\"city\":\"Santiago\"}", "receipt-1")
///     .with_attribute(SIGNATURE_ATTRIBUTE, "3f1c2d9e-0000-4000-8000-000000000000");
///
/// assert_eq!(message.signature(), Some("3f1c2d9e-0000-4000-8000-000000000000"));
/// assert_eq!(message.response_queue_url(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Message payload, never parsed by the relay itself
    pub body: String,
    /// Transport-issued token identifying this delivery
    pub receipt_handle: String,
    /// Message attributes
    pub attributes: MessageAttributes,
}

impl QueueMessage {
    pub fn new(body: impl Into<String>, receipt_handle: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            receipt_handle: receipt_handle.into(),
            attributes: MessageAttributes::new(),
        }
    }

    /// Builder-style attribute insertion
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Correlation token, present on two-way requests and on replies
    pub fn signature(&self) -> Option<&str> {
        self.attributes.get(SIGNATURE_ATTRIBUTE).map(String::as_str)
    }

    /// Reply destination, present on two-way requests only
    pub fn response_queue_url(&self) -> Option<&str> {
        self.attributes
            .get(RESPONSE_QUEUE_URL_ATTRIBUTE)
            .map(String::as_str)
    }
}

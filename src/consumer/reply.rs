//! Reply routing back to the requesting producer

use std::sync::Arc;

use crate::transport::{
    MessageAttributes, QueueMessage, QueueTransport, TransportError, SIGNATURE_ATTRIBUTE,
};

/// What happened to a handler's reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Sent,
    /// The request lacked a signature or response queue; nothing was sent
    MissingCorrelation,
    Failed(TransportError),
}

/// Sends replies to the response queue named by the request
///
/// Only the `Signature` attribute is copied onto the reply.
#[derive(Clone)]
pub struct ReplyRouter {
    transport: Arc<dyn QueueTransport>,
}

impl ReplyRouter {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self { transport }
    }

    /// Never fails; problems are logged and reported in the outcome
    pub async fn route(&self, request: &QueueMessage, reply: &str) -> ReplyOutcome {
        let (Some(response_url), Some(signature)) =
            (request.response_queue_url(), request.signature())
        else {
            log::warn!(
                "Reply dropped: request {} has no correlation attributes",
                request.receipt_handle
            );
            return ReplyOutcome::MissingCorrelation;
        };

        let mut attributes = MessageAttributes::new();
        attributes.insert(SIGNATURE_ATTRIBUTE.to_string(), signature.to_string());

        match self.transport.send(response_url, reply, &attributes).await {
            Ok(()) => {
                log::debug!("Reply {} sent to {}", signature, response_url);
                ReplyOutcome::Sent
            }
            Err(e) => {
                log::error!("Reply {} could not be sent: {}", signature, e);
                ReplyOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, RESPONSE_QUEUE_URL_ATTRIBUTE};

    #[tokio::test]
    async fn test_reply_copies_only_signature() {
        let transport = MemoryTransport::new();
        let response_url = transport.create_queue("responses").await.unwrap();
        let router = ReplyRouter::new(Arc::new(transport.clone()));
        let request = QueueMessage::new("query", "rh-1")
            .with_attribute(SIGNATURE_ATTRIBUTE, "sig-1")
            .with_attribute(RESPONSE_QUEUE_URL_ATTRIBUTE, response_url.clone())
            .with_attribute("TraceId", "abc");

        assert_eq!(router.route(&request, "answer").await, ReplyOutcome::Sent);

        let sent = transport.sent_messages(&response_url);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "answer");
        assert_eq!(sent[0].attributes.len(), 1);
        assert_eq!(sent[0].attributes[SIGNATURE_ATTRIBUTE], "sig-1");
    }

    #[tokio::test]
    async fn test_missing_attributes_send_nothing() {
        let transport = MemoryTransport::new();
        let response_url = transport.create_queue("responses").await.unwrap();
        let router = ReplyRouter::new(Arc::new(transport.clone()));

        let unsigned = QueueMessage::new("q", "rh-1")
            .with_attribute(RESPONSE_QUEUE_URL_ATTRIBUTE, response_url.clone());
        let no_destination = QueueMessage::new("q", "rh-2").with_attribute(SIGNATURE_ATTRIBUTE, "s");

        assert_eq!(
            router.route(&unsigned, "a").await,
            ReplyOutcome::MissingCorrelation
        );
        assert_eq!(
            router.route(&no_destination, "a").await,
            ReplyOutcome::MissingCorrelation
        );
        assert!(transport.sent_messages(&response_url).is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_is_reported_not_raised() {
        let transport = MemoryTransport::new();
        let router = ReplyRouter::new(Arc::new(transport.clone()));
        let request = QueueMessage::new("q", "rh-1")
            .with_attribute(SIGNATURE_ATTRIBUTE, "s")
            .with_attribute(RESPONSE_QUEUE_URL_ATTRIBUTE, "memory://queues/gone");

        let outcome = router.route(&request, "a").await;
        assert!(matches!(outcome, ReplyOutcome::Failed(TransportError::Send { .. })));
    }
}

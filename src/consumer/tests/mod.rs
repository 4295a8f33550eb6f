//! Test modules for the consumer side


use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::consumer::{handler_fn, HandlerError, MessageHandler};
use crate::transport::{
    MemoryTransport, MessageAttributes, QueueMessage, QueueTransport, TransportResult,
    RESPONSE_QUEUE_URL_ATTRIBUTE, SIGNATURE_ATTRIBUTE,
};

/// Memory transport that also keeps one ordered log of sends and acks
#[derive(Clone, Default)]
pub(super) struct RecordingTransport {
    pub inner: MemoryTransport,
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingTransport {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl QueueTransport for RecordingTransport {
    async fn create_queue(&self, name: &str) -> TransportResult<String> {
        self.inner.create_queue(name).await
    }

    async fn delete_queue(&self, url: &str) -> TransportResult<()> {
        self.inner.delete_queue(url).await
    }

    async fn get_queue_url(&self, name: &str) -> TransportResult<Option<String>> {
        self.inner.get_queue_url(name).await
    }

    async fn send(
        &self,
        url: &str,
        body: &str,
        attributes: &MessageAttributes,
    ) -> TransportResult<()> {
        self.inner.send(url, body, attributes).await?;
        self.record(format!("send:{}", body));
        Ok(())
    }

    async fn receive(
        &self,
        url: &str,
        max_messages: usize,
        wait_seconds: u64,
    ) -> TransportResult<Vec<QueueMessage>> {
        self.inner.receive(url, max_messages, wait_seconds).await
    }

    async fn delete_message(&self, url: &str, receipt_handle: &str) -> TransportResult<()> {
        self.inner.delete_message(url, receipt_handle).await?;
        self.record(format!("ack:{}", receipt_handle));
        Ok(())
    }
}

/// Send a two-way style request to `source` whose reply goes to `responses`
pub(super) async fn send_request(
    transport: &MemoryTransport,
    source: &str,
    responses: &str,
    body: &str,
) {
    let mut attributes = MessageAttributes::new();
    attributes.insert(SIGNATURE_ATTRIBUTE.to_string(), format!("sig-{}", body));
    attributes.insert(RESPONSE_QUEUE_URL_ATTRIBUTE.to_string(), responses.to_string());
    transport.send(source, body, &attributes).await.unwrap();
}

pub(super) fn echo_handler() -> Arc<dyn MessageHandler> {
    Arc::new(handler_fn(|body: String| async move { Ok(Some(body)) }))
}

pub(super) fn silent_handler() -> Arc<dyn MessageHandler> {
    Arc::new(handler_fn(|_body: String| async move { Ok(None) }))
}

pub(super) fn failing_handler() -> Arc<dyn MessageHandler> {
    Arc::new(handler_fn(|body: String| async move {
        Err(HandlerError::new(format!("cannot handle {}", body)))
    }))
}

//! Test modules for the response broker

mod correlation;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::producer::BrokerSettings;
use crate::transport::{
    MemoryTransport, MessageAttributes, QueueTransport, RESPONSE_QUEUE_URL_ATTRIBUTE,
    SIGNATURE_ATTRIBUTE,
};

/// Settings with short waits so failures surface quickly
pub(super) fn fast_settings() -> BrokerSettings {
    BrokerSettings {
        application_name: "broker-test".to_string(),
        queue_url_wait: Duration::from_millis(500),
        long_poll_seconds: 1,
        poll_error_backoff: Duration::from_millis(10),
        ..BrokerSettings::default()
    }
}

/// Answer every request on `target` with `reply(body)`, `count` times
pub(super) fn spawn_responder(
    transport: MemoryTransport,
    target: String,
    count: usize,
    reply: fn(&str) -> String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut answered = 0;
        while answered < count {
            let batch = transport.receive(&target, 10, 1).await.unwrap();
            for message in batch {
                let response_url = message
                    .attributes
                    .get(RESPONSE_QUEUE_URL_ATTRIBUTE)
                    .cloned()
                    .unwrap();
                let mut attributes = MessageAttributes::new();
                attributes.insert(
                    SIGNATURE_ATTRIBUTE.to_string(),
                    message.signature().unwrap().to_string(),
                );
                transport
                    .send(&response_url, &reply(&message.body), &attributes)
                    .await
                    .unwrap();
                transport
                    .delete_message(&target, &message.receipt_handle)
                    .await
                    .unwrap();
                answered += 1;
            }
        }
    })
}

pub(super) fn shared(transport: &MemoryTransport) -> Arc<dyn QueueTransport> {
    Arc::new(transport.clone())
}

//! Shared fixtures for relay integration tests

#![allow(dead_code)]

use std::sync::Arc;

use qrelay::consumer::{ListenerOrchestrator, ListenerRegistry, OrchestratorSettings};
use qrelay::core::config::Settings;
use qrelay::producer::{BrokerSettings, ResponseBroker};
use qrelay::transport::{MemoryTransport, QueueTransport};

/// Settings pointing the demo listeners at freshly created memory queues
pub async fn coordinate_settings(transport: &MemoryTransport) -> Settings {
    let twoways = transport.create_queue("twoways").await.unwrap();
    let oneway = transport.create_queue("oneway").await.unwrap();
    let mut settings = Settings::from_toml_str(&format!(
        r#"
        application.name = "it"

        [twoways.queue]
        url = "{twoways}"

        [oneway.queue]
        url = "{oneway}"

        [broker]
        long_poll_secs = 1
        queue_url_wait_secs = 2

        [listeners]
        long_poll_secs = 1
        "#
    ))
    .unwrap();
    settings.broker.reply_timeout = std::time::Duration::from_secs(5);
    settings
}

/// Broker settings with short polls so shutdown stays quick
pub fn fast_broker_settings() -> BrokerSettings {
    BrokerSettings {
        application_name: "it".to_string(),
        long_poll_seconds: 1,
        ..BrokerSettings::default()
    }
}

/// Fast listener settings, keeping the default suspension
pub fn fast_listener_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        long_poll_seconds: 1,
        ..OrchestratorSettings::default()
    }
}

/// A running consumer and producer sharing one memory transport
pub struct Relay {
    pub transport: MemoryTransport,
    pub orchestrator: ListenerOrchestrator,
    pub broker: ResponseBroker,
}

impl Relay {
    pub async fn start(
        transport: MemoryTransport,
        registry: ListenerRegistry,
        listeners: OrchestratorSettings,
        broker: BrokerSettings,
    ) -> Self {
        let shared: Arc<dyn QueueTransport> = Arc::new(transport.clone());
        let orchestrator = ListenerOrchestrator::new(Arc::clone(&shared), registry, listeners);
        orchestrator.start().unwrap();
        let broker = ResponseBroker::start(shared, broker).await;
        Self {
            transport,
            orchestrator,
            broker,
        }
    }

    pub async fn stop(self) {
        self.broker.shutdown().await;
        self.orchestrator.stop().await;
    }
}

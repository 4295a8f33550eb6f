//! Tests for transport provider discovery

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::core::config::Settings;
    use crate::transport::{
        MemoryTransport, QueueTransport, TransportError, TransportFuture, TransportRegistry,
    };

    fn fake_factory(_settings: &Settings) -> TransportFuture {
        Box::pin(async { Ok(Arc::new(MemoryTransport::new()) as Arc<dyn QueueTransport>) })
    }

    #[test]
    fn test_discover_finds_memory_provider() {
        let registry = TransportRegistry::discover();

        assert!(registry.contains("memory"));
        assert!(registry.providers().contains(&"memory"));
    }

    #[test]
    fn test_provider_names_are_case_sensitive() {
        let registry = TransportRegistry::discover();

        assert!(!registry.contains("Memory"));
        assert!(!registry.contains("MEMORY"));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = TransportRegistry::new();

        assert!(registry.register("fake", fake_factory));
        assert!(!registry.register("fake", fake_factory));
        assert_eq!(registry.providers(), vec!["fake"]);
    }

    #[tokio::test]
    async fn test_create_known_provider() {
        let registry = TransportRegistry::discover();
        let transport = registry
            .create("memory", &Settings::default())
            .await
            .unwrap();

        let url = transport.create_queue("probe").await.unwrap();
        assert!(url.ends_with("probe"));
    }

    #[tokio::test]
    async fn test_create_unknown_provider_lists_alternatives() {
        let mut registry = TransportRegistry::new();
        registry.register("fake", fake_factory);

        let err = registry
            .create("kafka", &Settings::default())
            .await
            .err().unwrap();
        match err {
            TransportError::UnknownProvider {
                provider,
                available,
            } => {
                assert_eq!(provider, "kafka");
                assert_eq!(available, vec!["fake".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

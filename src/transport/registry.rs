//! Transport provider registry
//!
//! Providers register a factory under a name with the [`register_transport!`]
//! macro; the registry discovers them at startup and builds the transport
//! selected by the `queue.provider` setting. Provider names are case-sensitive.
//!
//! [`register_transport!`]: crate::register_transport

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::config::Settings;
use crate::transport::error::{TransportError, TransportResult};
use crate::transport::traits::QueueTransport;

/// Future returned by a transport factory
pub type TransportFuture =
    Pin<Box<dyn Future<Output = TransportResult<Arc<dyn QueueTransport>>> + Send>>;

/// Factory building a transport from the loaded settings
pub type TransportFactory = fn(&Settings) -> TransportFuture;

/// Entry for a transport provider in the static registry
pub struct TransportEntry {
    pub provider: &'static str,
    pub factory: TransportFactory,
}

inventory::collect!(TransportEntry);

/// Register a transport factory under a provider name
#[macro_export]
macro_rules! register_transport {
    ($provider:expr, $factory:expr) => {
        inventory::submit! {
            $crate::transport::registry::TransportEntry {
                provider: $provider,
                factory: $factory,
            }
        }
    };
}

/// Name-to-factory map used to construct the configured transport
#[derive(Default)]
pub struct TransportRegistry {
    factories: HashMap<&'static str, TransportFactory>,
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

impl TransportRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from every provider compiled into the binary
    pub fn discover() -> Self {
        let mut registry = Self::new();
        for entry in inventory::iter::<TransportEntry> {
            if !registry.register(entry.provider, entry.factory) {
                log::warn!(
                    "Transport provider '{}' registered more than once; keeping the first",
                    entry.provider
                );
            }
        }
        log::trace!("Discovered transport providers: {:?}", registry.providers());
        registry
    }

    /// Add a provider; returns false if the name is already taken
    pub fn register(&mut self, provider: &'static str, factory: TransportFactory) -> bool {
        if self.factories.contains_key(provider) {
            return false;
        }
        self.factories.insert(provider, factory);
        true
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.factories.contains_key(provider)
    }

    /// Registered provider names, sorted
    pub fn providers(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Construct the transport registered as `provider`
    pub async fn create(
        &self,
        provider: &str,
        settings: &Settings,
    ) -> TransportResult<Arc<dyn QueueTransport>> {
        let factory = self
            .factories
            .get(provider)
            .ok_or_else(|| TransportError::UnknownProvider {
                provider: provider.to_string(),
                available: self.providers().iter().map(|p| p.to_string()).collect(),
            })?;
        log::info!("Using queue provider '{}'", provider);
        factory(settings).await
    }
}

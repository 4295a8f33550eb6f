//! Listener registry
//!
//! Collects listener descriptors before the orchestrator starts. Each source
//! queue may have exactly one listener. The orchestrator takes the registry
//! by value, so it cannot change once polling has begun.

use std::sync::Arc;
use std::time::Duration;

use crate::consumer::error::{ListenerError, ListenerResult};
use crate::consumer::handler::{MessageHandler, QueueListener};
use crate::core::config::Settings;
use crate::transport::MAX_RECEIVE_BATCH;

/// Everything the orchestrator needs to poll one queue
#[derive(Clone)]
pub struct ListenerDescriptor {
    pub source_queue_url: String,
    pub handler: Arc<dyn MessageHandler>,
    /// Process a batch concurrently rather than in received order
    pub parallel: bool,
    pub max_batch: usize,
    /// Floor on the wall-clock time spent per message
    pub min_processing: Duration,
}

impl std::fmt::Debug for ListenerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerDescriptor")
            .field("source_queue_url", &self.source_queue_url)
            .field("parallel", &self.parallel)
            .field("max_batch", &self.max_batch)
            .field("min_processing", &self.min_processing)
            .finish_non_exhaustive()
    }
}

impl ListenerDescriptor {
    /// Sequential listener taking batches of up to 10
    pub fn new(source_queue_url: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            source_queue_url: source_queue_url.into(),
            handler,
            parallel: false,
            max_batch: MAX_RECEIVE_BATCH,
            min_processing: Duration::ZERO,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    pub fn min_processing(mut self, min_processing: Duration) -> Self {
        self.min_processing = min_processing;
        self
    }
}

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Vec<ListenerDescriptor>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ListenerDescriptor) -> ListenerResult<()> {
        if !(1..=MAX_RECEIVE_BATCH).contains(&descriptor.max_batch) {
            return Err(ListenerError::InvalidBatchSize {
                url: descriptor.source_queue_url,
                max_batch: descriptor.max_batch,
            });
        }
        if self.contains(&descriptor.source_queue_url) {
            return Err(ListenerError::DuplicateListener {
                url: descriptor.source_queue_url,
            });
        }
        log::debug!(
            "Registered listener on {} (parallel: {}, max batch: {}, min processing: {:?})",
            descriptor.source_queue_url,
            descriptor.parallel,
            descriptor.max_batch,
            descriptor.min_processing
        );
        self.listeners.push(descriptor);
        Ok(())
    }

    /// Register a listener whose queue URL comes from `settings`
    pub fn register_bound<L>(&mut self, settings: &Settings, listener: L) -> ListenerResult<()>
    where
        L: QueueListener + 'static,
    {
        let binding = listener.binding();
        let url = settings
            .property(&binding.url_property)
            .ok_or_else(|| ListenerError::MissingProperty {
                property: binding.url_property.clone(),
            })?;
        let descriptor = ListenerDescriptor::new(url, Arc::new(listener))
            .parallel(binding.parallel)
            .max_batch(binding.max_batch)
            .min_processing(binding.min_processing);
        self.register(descriptor)
    }

    pub fn contains(&self, source_queue_url: &str) -> bool {
        self.listeners
            .iter()
            .any(|d| d.source_queue_url == source_queue_url)
    }

    pub fn get(&self, source_queue_url: &str) -> Option<&ListenerDescriptor> {
        self.listeners
            .iter()
            .find(|d| d.source_queue_url == source_queue_url)
    }

    /// Descriptors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ListenerDescriptor> {
        self.listeners.iter()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn into_descriptors(self) -> Vec<ListenerDescriptor> {
        self.listeners
    }
}

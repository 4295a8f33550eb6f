//! Queue Transport
//!
//! The single coupling point between the relay and the queue service it runs
//! on. The producer's response broker and the consumer's listener orchestrator
//! both talk to the outside world exclusively through [`QueueTransport`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐        ┌─────────────────────┐
//! │ ResponseBroker │        │ ListenerOrchestrator│
//! └───────┬────────┘        └──────────┬──────────┘
//!         │   send / receive / delete  │
//!         ▼                            ▼
//! ┌─────────────────────────────────────────────────┐
//! │            dyn QueueTransport (Arc)             │
//! └───────┬──────────────────────────────┬──────────┘
//!         ▼                              ▼
//! ┌────────────────┐            ┌─────────────────┐
//! │MemoryTransport │            │  SqsTransport   │
//! │   "memory"     │            │ "sqs" (feature) │
//! └────────────────┘            └─────────────────┘
//! ```
//!
//! Implementations are selected at startup by provider name through the
//! [`TransportRegistry`].

mod error;
mod memory;
mod message;
pub mod registry;
#[cfg(feature = "sqs")]
mod sqs;
mod traits;

pub use error::{TransportError, TransportResult};
pub use memory::{MemoryTransport, SentMessage, MEMORY_URL_PREFIX};
pub use message::{
    MessageAttributes, QueueMessage, RESPONSE_QUEUE_URL_ATTRIBUTE, SIGNATURE_ATTRIBUTE,
};
pub use registry::{TransportEntry, TransportFactory, TransportFuture, TransportRegistry};
#[cfg(feature = "sqs")]
pub use sqs::SqsTransport;
pub use traits::{QueueTransport, LONG_POLL_SECONDS, MAX_RECEIVE_BATCH};

#[cfg(test)]
mod tests;

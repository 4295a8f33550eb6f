//! Producer side: requests that expect a reply
//!
//! [`ResponseBroker`] is the entry point. It owns one private response queue
//! per process and pairs replies with requests through a [`CorrelationStore`]
//! keyed by [`CorrelationToken`].

mod broker;
mod error;
pub mod naming;
mod store;
mod token;

pub use broker::{BrokerSettings, QueueState, ResponseBroker};
pub use error::{BrokerError, BrokerResult};
pub use store::{CorrelationStore, DEFAULT_ORPHAN_TTL};
pub use token::CorrelationToken;

#[cfg(test)]
mod tests;

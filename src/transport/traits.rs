//! Queue transport capability boundary
//!
//! The relay core touches the outside world only through [`QueueTransport`].
//! Implementations must be safe for concurrent use from many tasks.

use async_trait::async_trait;

use crate::transport::error::TransportResult;
use crate::transport::message::{MessageAttributes, QueueMessage};

/// Long-poll wait the relay requests on every receive
pub const LONG_POLL_SECONDS: u64 = 20;

/// Upper bound on messages returned by a single receive
pub const MAX_RECEIVE_BATCH: usize = 10;

/// Primitive operations of an SQS-like queue service
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Create a queue and return its URL
    async fn create_queue(&self, name: &str) -> TransportResult<String>;

    /// Delete the queue behind `url`
    async fn delete_queue(&self, url: &str) -> TransportResult<()>;

    /// Resolve a queue name to its URL
    ///
    /// Returns `Ok(None)` when the queue does not exist; any other failure
    /// is a `QueueLookup` error.
    async fn get_queue_url(&self, name: &str) -> TransportResult<Option<String>>;

    /// Send `body` with the given string attributes
    async fn send(&self, url: &str, body: &str, attributes: &MessageAttributes)
        -> TransportResult<()>;

    /// Receive up to `max_messages`, waiting up to `wait_seconds` for the first
    ///
    /// An empty vector means the wait elapsed with nothing to deliver.
    async fn receive(
        &self,
        url: &str,
        max_messages: usize,
        wait_seconds: u64,
    ) -> TransportResult<Vec<QueueMessage>>;

    /// Acknowledge a received message so it is not redelivered
    async fn delete_message(&self, url: &str, receipt_handle: &str) -> TransportResult<()>;
}

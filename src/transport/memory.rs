//! In-process queue transport
//!
//! A faithful stand-in for an SQS-style service that lives entirely in memory:
//! named queues, long-poll receive, receipt handles that must be presented to
//! delete a delivered message, and per-message string attributes. Useful for
//! single-process deployments, demos and tests.
//!
//! Besides the transport itself the type keeps a call log and supports fault
//! injection so tests can observe and perturb the traffic the relay produces.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::core::config::Settings;
use crate::transport::error::{TransportError, TransportResult};
use crate::transport::message::{MessageAttributes, QueueMessage};
use crate::transport::registry::TransportFuture;
use crate::transport::traits::{QueueTransport, MAX_RECEIVE_BATCH};

crate::register_transport!("memory", memory_factory);

fn memory_factory(_settings: &Settings) -> TransportFuture {
    Box::pin(async {
        log::debug!("Creating in-memory queue transport");
        Ok(Arc::new(MemoryTransport::new()) as Arc<dyn QueueTransport>)
    })
}

/// URL prefix of every in-memory queue
pub const MEMORY_URL_PREFIX: &str = "memory://queues/";

/// Maximum queue name length accepted by the transport
const MAX_QUEUE_NAME_LEN: usize = 80;

/// A message as it was handed to `send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub body: String,
    pub attributes: MessageAttributes,
}

struct StoredMessage {
    body: String,
    attributes: MessageAttributes,
}

struct MemoryQueue {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    fn take_batch(&mut self, max_messages: usize, receipts: &AtomicU64) -> Vec<QueueMessage> {
        let count = max_messages.min(self.ready.len());
        let mut batch = Vec::with_capacity(count);
        for stored in self.ready.drain(..count) {
            let receipt_handle = format!("rh-{}", receipts.fetch_add(1, Ordering::Relaxed));
            batch.push(QueueMessage {
                body: stored.body.clone(),
                receipt_handle: receipt_handle.clone(),
                attributes: stored.attributes.clone(),
            });
            self.in_flight.insert(receipt_handle, stored);
        }
        batch
    }
}

#[derive(Default)]
struct CallLog {
    sent: HashMap<String, Vec<SentMessage>>,
    deleted: HashMap<String, Vec<String>>,
    receive_calls: HashMap<String, usize>,
    active_receives: HashMap<String, usize>,
    max_concurrent_receives: HashMap<String, usize>,
    created: Vec<String>,
    removed: Vec<String>,
}

#[derive(Default)]
struct Faults {
    create: usize,
    remove: usize,
    delete: usize,
    receive: HashMap<String, usize>,
    send: HashMap<String, usize>,
}

#[derive(Default)]
struct MemoryState {
    queues: Mutex<HashMap<String, MemoryQueue>>,
    log: Mutex<CallLog>,
    faults: Mutex<Faults>,
    receipts: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks a receive in the call log for as long as it is outstanding,
/// including when the receiving future is dropped mid-wait.
struct ReceiveGuard<'a> {
    state: &'a MemoryState,
    url: String,
}

impl<'a> ReceiveGuard<'a> {
    fn enter(state: &'a MemoryState, url: &str) -> Self {
        let mut log = lock(&state.log);
        *log.receive_calls.entry(url.to_string()).or_default() += 1;
        let active = log.active_receives.entry(url.to_string()).or_default();
        *active += 1;
        let active = *active;
        let max = log
            .max_concurrent_receives
            .entry(url.to_string())
            .or_default();
        *max = (*max).max(active);
        Self {
            state,
            url: url.to_string(),
        }
    }
}

impl Drop for ReceiveGuard<'_> {
    fn drop(&mut self) {
        let mut log = lock(&self.state.log);
        if let Some(active) = log.active_receives.get_mut(&self.url) {
            *active = active.saturating_sub(1);
        }
    }
}

/// In-memory implementation of [`QueueTransport`]
///
/// Cloning yields another handle onto the same set of queues.
///
/// # Example
///
/// ```rust
/// use qrelay::transport::{MemoryTransport, MessageAttributes, QueueTransport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = MemoryTransport::new();
/// let url = transport.create_queue("orders").await?;
///
/// transport.send(&url, "hello", &MessageAttributes::new()).await?;
/// let messages = transport.receive(&url, 10, 0).await?;
/// transport.delete_message(&url, &messages[0].receipt_handle).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_fault(counter: &mut usize) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }

    fn take_keyed_fault(counters: &mut HashMap<String, usize>, url: &str) -> bool {
        counters
            .get_mut(url)
            .map(Self::take_fault)
            .unwrap_or(false)
    }

    fn validate_queue_name(name: &str) -> Result<(), String> {
        if name.is_empty() || name.len() > MAX_QUEUE_NAME_LEN {
            return Err(format!(
                "queue name must be 1-{} characters, got {}",
                MAX_QUEUE_NAME_LEN,
                name.len()
            ));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(format!("invalid character '{}' in queue name", bad));
        }
        Ok(())
    }

    // Fault injection

    /// Make the next `count` queue creations fail
    pub fn fail_next_creates(&self, count: usize) {
        lock(&self.state.faults).create = count;
    }

    /// Make the next `count` queue deletions fail
    pub fn fail_next_queue_removals(&self, count: usize) {
        lock(&self.state.faults).remove = count;
    }

    /// Make the next `count` message deletions fail, on any queue
    pub fn fail_next_deletes(&self, count: usize) {
        lock(&self.state.faults).delete = count;
    }

    /// Make the next `count` receives on `url` fail
    pub fn fail_next_receives(&self, url: &str, count: usize) {
        lock(&self.state.faults)
            .receive
            .insert(url.to_string(), count);
    }

    /// Make the next `count` sends to `url` fail
    pub fn fail_next_sends(&self, url: &str, count: usize) {
        lock(&self.state.faults).send.insert(url.to_string(), count);
    }

    // Call log

    /// Every message sent to `url`, in send order
    pub fn sent_messages(&self, url: &str) -> Vec<SentMessage> {
        lock(&self.state.log)
            .sent
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    /// Receipt handles successfully deleted from `url`, in deletion order
    pub fn deleted_receipts(&self, url: &str) -> Vec<String> {
        lock(&self.state.log)
            .deleted
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of receive calls issued against `url`
    pub fn receive_calls(&self, url: &str) -> usize {
        lock(&self.state.log)
            .receive_calls
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of receives that were outstanding on `url` at once
    pub fn max_concurrent_receives(&self, url: &str) -> usize {
        lock(&self.state.log)
            .max_concurrent_receives
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Names passed to successful `create_queue` calls
    pub fn created_queues(&self) -> Vec<String> {
        lock(&self.state.log).created.clone()
    }

    /// URLs passed to successful `delete_queue` calls
    pub fn removed_queues(&self) -> Vec<String> {
        lock(&self.state.log).removed.clone()
    }

    // Queue inspection

    /// Whether a queue with this URL currently exists
    pub fn queue_exists(&self, url: &str) -> bool {
        lock(&self.state.queues).contains_key(url)
    }

    /// Messages waiting to be received on `url`
    pub fn ready_count(&self, url: &str) -> usize {
        lock(&self.state.queues)
            .get(url)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Messages delivered from `url` but not yet deleted
    pub fn in_flight_count(&self, url: &str) -> usize {
        lock(&self.state.queues)
            .get(url)
            .map(|q| q.in_flight.len())
            .unwrap_or(0)
    }

    /// Return every undeleted delivery on `url` to the ready list,
    /// as a visibility timeout expiring would
    pub fn redeliver_in_flight(&self, url: &str) -> usize {
        let mut queues = lock(&self.state.queues);
        let Some(queue) = queues.get_mut(url) else {
            return 0;
        };
        let returned: Vec<StoredMessage> = queue.in_flight.drain().map(|(_, m)| m).collect();
        let count = returned.len();
        queue.ready.extend(returned);
        queue.notify.notify_waiters();
        count
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    async fn create_queue(&self, name: &str) -> TransportResult<String> {
        if Self::take_fault(&mut lock(&self.state.faults).create) {
            return Err(TransportError::queue_creation(name, "injected failure"));
        }
        Self::validate_queue_name(name).map_err(|e| TransportError::queue_creation(name, e))?;

        let url = format!("{}{}", MEMORY_URL_PREFIX, name);
        lock(&self.state.queues)
            .entry(url.clone())
            .or_insert_with(MemoryQueue::new);
        lock(&self.state.log).created.push(name.to_string());
        log::debug!("Memory transport created queue {}", url);
        Ok(url)
    }

    async fn delete_queue(&self, url: &str) -> TransportResult<()> {
        if Self::take_fault(&mut lock(&self.state.faults).remove) {
            return Err(TransportError::queue_removal(url, "injected failure"));
        }
        let removed = lock(&self.state.queues).remove(url);
        match removed {
            Some(queue) => {
                queue.notify.notify_waiters();
                lock(&self.state.log).removed.push(url.to_string());
                log::debug!("Memory transport deleted queue {}", url);
                Ok(())
            }
            None => Err(TransportError::queue_removal(url, "queue does not exist")),
        }
    }

    async fn get_queue_url(&self, name: &str) -> TransportResult<Option<String>> {
        let url = format!("{}{}", MEMORY_URL_PREFIX, name);
        let exists = lock(&self.state.queues).contains_key(&url);
        Ok(exists.then_some(url))
    }

    async fn send(
        &self,
        url: &str,
        body: &str,
        attributes: &MessageAttributes,
    ) -> TransportResult<()> {
        if Self::take_keyed_fault(&mut lock(&self.state.faults).send, url) {
            return Err(TransportError::send(url, "injected failure"));
        }
        {
            let mut queues = lock(&self.state.queues);
            let queue = queues
                .get_mut(url)
                .ok_or_else(|| TransportError::send(url, "queue does not exist"))?;
            queue.ready.push_back(StoredMessage {
                body: body.to_string(),
                attributes: attributes.clone(),
            });
            queue.notify.notify_waiters();
        }
        lock(&self.state.log)
            .sent
            .entry(url.to_string())
            .or_default()
            .push(SentMessage {
                body: body.to_string(),
                attributes: attributes.clone(),
            });
        Ok(())
    }

    async fn receive(
        &self,
        url: &str,
        max_messages: usize,
        wait_seconds: u64,
    ) -> TransportResult<Vec<QueueMessage>> {
        let _guard = ReceiveGuard::enter(&self.state, url);
        if Self::take_keyed_fault(&mut lock(&self.state.faults).receive, url) {
            return Err(TransportError::poll(url, "injected failure"));
        }

        let max_messages = max_messages.clamp(1, MAX_RECEIVE_BATCH);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(wait_seconds);

        loop {
            let notify = {
                let queues = lock(&self.state.queues);
                let queue = queues
                    .get(url)
                    .ok_or_else(|| TransportError::poll(url, "queue does not exist"))?;
                Arc::clone(&queue.notify)
            };

            // Register interest before checking, so a send between the check
            // and the wait is not missed
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut queues = lock(&self.state.queues);
                let queue = queues
                    .get_mut(url)
                    .ok_or_else(|| TransportError::poll(url, "queue does not exist"))?;
                if !queue.ready.is_empty() {
                    return Ok(queue.take_batch(max_messages, &self.state.receipts));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn delete_message(&self, url: &str, receipt_handle: &str) -> TransportResult<()> {
        if Self::take_fault(&mut lock(&self.state.faults).delete) {
            return Err(TransportError::ack(url, "injected failure"));
        }
        {
            let mut queues = lock(&self.state.queues);
            let queue = queues
                .get_mut(url)
                .ok_or_else(|| TransportError::ack(url, "queue does not exist"))?;
            if queue.in_flight.remove(receipt_handle).is_none() {
                return Err(TransportError::ack(
                    url,
                    format!("receipt handle {} is not valid", receipt_handle),
                ));
            }
        }
        lock(&self.state.log)
            .deleted
            .entry(url.to_string())
            .or_default()
            .push(receipt_handle.to_string());
        Ok(())
    }
}

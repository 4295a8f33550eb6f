//! Response broker
//!
//! Owns the producer's private response queue and everything needed to turn
//! a one-way send into a request that can be awaited:
//!
//! - startup creates `<application>_RQ_TEMP_<uuid>`; failure leaves the broker
//!   degraded, where two-way sends fail fast and one-way sends still work
//! - each two-way send registers a fresh correlation token, tags the message
//!   with it and the response queue URL, then awaits the token's slot
//! - a single background task long-polls the response queue while anybody is
//!   waiting, acknowledges each reply and publishes it by token
//! - shutdown wakes every waiter empty, joins the poller and deletes the queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::retry::{retry_async, RetryPolicy};
use crate::producer::error::{BrokerError, BrokerResult};
use crate::producer::naming::{response_queue_name, DEFAULT_APPLICATION_NAME};
use crate::producer::store::{CorrelationStore, DEFAULT_ORPHAN_TTL};
use crate::producer::token::CorrelationToken;
use crate::transport::{
    MessageAttributes, QueueTransport, LONG_POLL_SECONDS, MAX_RECEIVE_BATCH,
    RESPONSE_QUEUE_URL_ATTRIBUTE, SIGNATURE_ATTRIBUTE,
};

/// Tunables for a [`ResponseBroker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Prefix of the response queue name
    pub application_name: String,
    /// Reply timeout used by callers that do not pass their own
    pub reply_timeout: Duration,
    /// How long a two-way send waits for the response queue to exist
    pub queue_url_wait: Duration,
    pub orphan_ttl: Duration,
    pub long_poll_seconds: u64,
    pub create_attempts: usize,
    /// Pause after a failed receive on the response queue
    pub poll_error_backoff: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            reply_timeout: Duration::from_secs(30),
            queue_url_wait: Duration::from_secs(10),
            orphan_ttl: DEFAULT_ORPHAN_TTL,
            long_poll_seconds: LONG_POLL_SECONDS,
            create_attempts: 1,
            poll_error_backoff: Duration::from_secs(1),
        }
    }
}

/// Lifecycle of the response queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueState {
    /// Creation has not finished yet
    Pending,
    Ready(String),
    /// Creation failed; only one-way sends are possible
    Degraded,
    Closed,
}

struct BrokerInner {
    transport: Arc<dyn QueueTransport>,
    settings: BrokerSettings,
    store: Arc<CorrelationStore>,
    queue_state: watch::Sender<QueueState>,
    shutdown: watch::Sender<bool>,
    pollers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl BrokerInner {
    fn pollers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pollers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BrokerInner {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.send_replace(true);
        self.store.cancel_all();
        let previous = self.queue_state.send_replace(QueueState::Closed);
        if let QueueState::Ready(url) = previous {
            // Best effort: only possible while a runtime is still around
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let transport = Arc::clone(&self.transport);
                handle.spawn(async move {
                    if let Err(e) = transport.delete_queue(&url).await {
                        log::warn!("Response queue not removed on drop: {}", e);
                    }
                });
            } else {
                log::warn!("Response queue {} left behind: no runtime to remove it", url);
            }
        }
    }
}

/// Producer-side request/response broker
///
/// Cheap to clone; all clones share one response queue and one poller.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use qrelay::producer::{BrokerSettings, ResponseBroker};
/// use qrelay::transport::{MemoryTransport, QueueTransport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Arc::new(MemoryTransport::new());
/// let target = transport.create_queue("coordinates").await?;
///
/// let broker = ResponseBroker::start(transport.clone(), BrokerSettings::default()).await;
/// broker.send_fire_and_forget(&target, "{\"name\":\"Coquimbo\"}").await?;
///
/// // Nobody answers on `target`, so this times out
/// let reply = broker
///     .send_and_await(&target, "{\"city\":\"Santiago\"}", Duration::from_millis(100))
///     .await?;
/// assert!(reply.is_none());
///
/// broker.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResponseBroker {
    inner: Arc<BrokerInner>,
}

impl std::fmt::Debug for ResponseBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBroker")
            .field("state", &*self.inner.queue_state.borrow())
            .field("pending", &self.inner.store.pending_count())
            .finish()
    }
}

impl ResponseBroker {
    /// Build a broker whose response queue does not exist yet
    ///
    /// Call [`initialize`](Self::initialize) to create it; two-way sends made
    /// in the meantime wait for it up to `queue_url_wait`.
    pub fn new(transport: Arc<dyn QueueTransport>, settings: BrokerSettings) -> Self {
        let (queue_state, _) = watch::channel(QueueState::Pending);
        let (shutdown, _) = watch::channel(false);
        let store = Arc::new(CorrelationStore::new(settings.orphan_ttl));
        Self {
            inner: Arc::new(BrokerInner {
                transport,
                settings,
                store,
                queue_state,
                shutdown,
                pollers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Build a broker and create its response queue
    pub async fn start(transport: Arc<dyn QueueTransport>, settings: BrokerSettings) -> Self {
        let broker = Self::new(transport, settings);
        broker.initialize().await;
        broker
    }

    /// Create the response queue, leaving the broker ready or degraded
    ///
    /// Does nothing unless the broker is still pending. Creation is not
    /// retried beyond `create_attempts`; a degraded broker stays degraded.
    pub async fn initialize(&self) {
        if *self.inner.queue_state.borrow() != QueueState::Pending {
            return;
        }
        let name = response_queue_name(&self.inner.settings.application_name);
        let transport = Arc::clone(&self.inner.transport);
        let result = retry_async(
            "create response queue",
            RetryPolicy::attempts(self.inner.settings.create_attempts),
            || {
                let transport = Arc::clone(&transport);
                let name = name.clone();
                async move { transport.create_queue(&name).await }
            },
        )
        .await;

        match result {
            Ok(url) => {
                let mut accepted = false;
                self.inner.queue_state.send_if_modified(|state| {
                    if *state == QueueState::Pending {
                        *state = QueueState::Ready(url.clone());
                        accepted = true;
                    }
                    accepted
                });
                if accepted {
                    log::info!("Response queue ready at {}", url);
                } else {
                    // Shut down while the queue was being created
                    if let Err(e) = self.inner.transport.delete_queue(&url).await {
                        log::warn!("Failed to remove response queue {}: {}", url, e);
                    }
                }
            }
            Err(e) => {
                log::error!(
                    "Response queue could not be created, two-way requests are disabled until restart: {}",
                    e
                );
                self.inner.queue_state.send_if_modified(|state| {
                    if *state == QueueState::Pending {
                        *state = QueueState::Degraded;
                        true
                    } else {
                        false
                    }
                });
            }
        }
    }

    pub fn state(&self) -> QueueState {
        self.inner.queue_state.borrow().clone()
    }

    pub fn is_degraded(&self) -> bool {
        self.state() == QueueState::Degraded
    }

    /// URL of the response queue once it exists
    pub fn response_queue_url(&self) -> Option<String> {
        match &*self.inner.queue_state.borrow() {
            QueueState::Ready(url) => Some(url.clone()),
            _ => None,
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.inner.settings
    }

    /// Requests currently awaiting a reply
    pub fn pending_requests(&self) -> usize {
        self.inner.store.pending_count()
    }

    /// Send `body` to `target_url` without correlation attributes
    pub async fn send_fire_and_forget(&self, target_url: &str, body: &str) -> BrokerResult<()> {
        self.inner
            .transport
            .send(target_url, body, &MessageAttributes::new())
            .await?;
        log::debug!("Sent one-way message to {}", target_url);
        Ok(())
    }

    /// Send a two-way request and wait up to `timeout` for its reply
    ///
    /// `Ok(None)` means no reply arrived in time, or the broker shut down
    /// while waiting.
    pub async fn send_and_await(
        &self,
        target_url: &str,
        body: &str,
        timeout: Duration,
    ) -> BrokerResult<Option<String>> {
        let token = self.send_for_response(target_url, body).await?;
        Ok(self.receive_response(&token, timeout).await)
    }

    /// Send a two-way request and return its token without waiting
    ///
    /// The reply must be collected with [`receive_response`](Self::receive_response).
    pub async fn send_for_response(
        &self,
        target_url: &str,
        body: &str,
    ) -> BrokerResult<CorrelationToken> {
        let queue_url = self.wait_for_queue_url().await?;

        let token = CorrelationToken::new();
        self.inner.store.register(token.clone())?;
        if let Err(e) = self.ensure_polling(&queue_url) {
            self.inner.store.cancel(&token);
            return Err(e);
        }

        let mut attributes = MessageAttributes::new();
        attributes.insert(SIGNATURE_ATTRIBUTE.to_string(), token.to_string());
        attributes.insert(RESPONSE_QUEUE_URL_ATTRIBUTE.to_string(), queue_url);

        if let Err(e) = self
            .inner
            .transport
            .send(target_url, body, &attributes)
            .await
        {
            self.inner.store.cancel(&token);
            return Err(e.into());
        }
        log::debug!("Sent request {} to {}", token, target_url);
        Ok(token)
    }

    /// Wait up to `timeout` for the reply to a request sent earlier
    ///
    /// The request is forgotten once this returns or the future is dropped.
    pub async fn receive_response(
        &self,
        token: &CorrelationToken,
        timeout: Duration,
    ) -> Option<String> {
        self.inner.store.await_reply(token, timeout).await
    }

    /// Forget a request whose reply will never be collected
    ///
    /// A token from [`send_for_response`](Self::send_for_response) keeps the
    /// response poller running until it is awaited or cancelled. Returns
    /// false if the token was not pending.
    pub fn cancel_response(&self, token: &CorrelationToken) -> bool {
        self.inner.store.cancel(token)
    }

    async fn wait_for_queue_url(&self) -> BrokerResult<String> {
        let mut state_rx = self.inner.queue_state.subscribe();
        let settled = tokio::time::timeout(
            self.inner.settings.queue_url_wait,
            state_rx.wait_for(|state| *state != QueueState::Pending),
        )
        .await;

        match settled {
            Ok(Ok(state)) => match &*state {
                QueueState::Ready(url) => Ok(url.clone()),
                QueueState::Closed => Err(BrokerError::ShutDown),
                QueueState::Pending | QueueState::Degraded => Err(BrokerError::NoResponseQueue),
            },
            Ok(Err(_)) => Err(BrokerError::ShutDown),
            Err(_) => {
                log::warn!(
                    "Response queue not available after {:?}",
                    self.inner.settings.queue_url_wait
                );
                Err(BrokerError::NoResponseQueue)
            }
        }
    }

    /// Start the response poller unless one is running
    ///
    /// Checked under the pollers lock so that no poller is spawned after
    /// `shutdown` has collected the handles it joins.
    fn ensure_polling(&self, queue_url: &str) -> BrokerResult<()> {
        let mut pollers = self.inner.pollers();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BrokerError::ShutDown);
        }
        if !self.inner.store.try_begin_polling() {
            return Ok(());
        }
        log::trace!("Starting response poller on {}", queue_url);
        let poller = ResponsePoller {
            transport: Arc::clone(&self.inner.transport),
            store: Arc::clone(&self.inner.store),
            queue_url: queue_url.to_string(),
            long_poll_seconds: self.inner.settings.long_poll_seconds,
            error_backoff: self.inner.settings.poll_error_backoff,
            shutdown: self.inner.shutdown.subscribe(),
        };
        pollers.retain(|handle| !handle.is_finished());
        pollers.push(tokio::spawn(poller.run()));
        Ok(())
    }

    /// Stop polling, wake every waiter empty and delete the response queue
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("Shutting down response broker");

        self.inner.shutdown.send_replace(true);
        let previous = self.inner.queue_state.send_replace(QueueState::Closed);
        let cancelled = self.inner.store.cancel_all();
        if cancelled > 0 {
            log::debug!("Cancelled {} pending requests", cancelled);
        }

        let handles: Vec<JoinHandle<()>> = self.inner.pollers().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                log::warn!("Response poller ended abnormally: {}", e);
            }
        }

        if let QueueState::Ready(url) = previous {
            match self.inner.transport.delete_queue(&url).await {
                Ok(()) => log::info!("Response queue {} removed", url),
                Err(e) => log::warn!("Ignoring failure to remove response queue: {}", e),
            }
        }
    }
}

/// The single-flight loop draining the response queue
struct ResponsePoller {
    transport: Arc<dyn QueueTransport>,
    store: Arc<CorrelationStore>,
    queue_url: String,
    long_poll_seconds: u64,
    error_backoff: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ResponsePoller {
    async fn run(mut self) {
        loop {
            if self.store.finish_polling_if_idle() {
                log::trace!("No pending requests, response poller exiting");
                return;
            }
            if *self.shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                received = self.transport.receive(
                    &self.queue_url,
                    MAX_RECEIVE_BATCH,
                    self.long_poll_seconds,
                ) => received,
                _ = self.shutdown.wait_for(|stop| *stop) => break,
            };

            match received {
                Ok(messages) => {
                    for message in messages {
                        // Acknowledge before the reply becomes visible to its waiter
                        if let Err(e) = self
                            .transport
                            .delete_message(&self.queue_url, &message.receipt_handle)
                            .await
                        {
                            log::warn!("Reply acknowledgement failed: {}", e);
                        }
                        match message.signature() {
                            Some(signature) => {
                                let token = CorrelationToken::from(signature);
                                self.store.publish(token, message.body);
                            }
                            None => log::warn!(
                                "Discarding reply without a {} attribute",
                                SIGNATURE_ATTRIBUTE
                            ),
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Polling the response queue failed: {}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(self.error_backoff) => {}
                        _ = self.shutdown.wait_for(|stop| *stop) => break,
                    }
                }
            }
        }
        self.store.end_polling();
    }
}

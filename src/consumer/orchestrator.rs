//! Listener orchestrator
//!
//! A single scheduler task drives every registered listener. On each pass it
//! starts a poll task for each listener that is not suspended, not already
//! polling and (in bounded mode) still below its poll quota. A poll task
//! long-polls the listener's queue and dispatches whatever arrives; the next
//! poll for that listener starts only after the whole batch is done.
//!
//! A poll that fails suspends its listener for `failure_suspension`; other
//! listeners keep running. Stopping lets receives and dispatches already in
//! progress finish; only dropping the orchestrator cuts a receive short. The scheduler owns all of its bookkeeping, poll
//! tasks only report back through their join handles.
//!
//! ```text
//!            ┌──────────── scheduler ────────────┐
//!            │ suspended? quota? in flight?      │
//!            └───┬───────────────┬───────────────┘
//!                ▼               ▼
//!          poll task (A)   poll task (B)   ...one per listener at a time
//!           receive ─► dispatch ─► handler ─► reply ─► ack
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::consumer::dispatcher::Dispatcher;
use crate::consumer::error::{ListenerError, ListenerResult};
use crate::consumer::registry::{ListenerDescriptor, ListenerRegistry};
use crate::transport::{QueueTransport, TransportResult, LONG_POLL_SECONDS};

/// Per-listener poll counts, keyed by source queue URL
pub type PollCounts = HashMap<String, usize>;

/// Scheduler tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// How long a listener is skipped after a failed poll
    pub failure_suspension: Duration,
    /// Pause when a scheduler pass starts no new poll
    pub idle_yield: Duration,
    pub long_poll_seconds: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            failure_suspension: Duration::from_secs(5 * 60),
            idle_yield: Duration::from_millis(10),
            long_poll_seconds: LONG_POLL_SECONDS,
        }
    }
}

/// Runs every registered listener until stopped
pub struct ListenerOrchestrator {
    transport: Arc<dyn QueueTransport>,
    settings: OrchestratorSettings,
    descriptors: Mutex<Option<Vec<ListenerDescriptor>>>,
    stop_tx: watch::Sender<bool>,
    abort_tx: watch::Sender<bool>,
    scheduler: Mutex<Option<JoinHandle<PollCounts>>>,
    stopped: AtomicBool,
}

impl ListenerOrchestrator {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        registry: ListenerRegistry,
        settings: OrchestratorSettings,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (abort_tx, _) = watch::channel(false);
        Self {
            transport,
            settings,
            descriptors: Mutex::new(Some(registry.into_descriptors())),
            stop_tx,
            abort_tx,
            scheduler: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    fn take_scheduler(&self) -> ListenerResult<Scheduler> {
        let descriptors = lock(&self.descriptors)
            .take()
            .ok_or(ListenerError::AlreadyStarted)?;
        Ok(Scheduler::new(
            Arc::clone(&self.transport),
            self.settings.clone(),
            descriptors,
            self.stop_tx.subscribe(),
            self.abort_tx.subscribe(),
        ))
    }

    /// Start polling in the background until [`stop`](Self::stop)
    pub fn start(&self) -> ListenerResult<()> {
        let scheduler = self.take_scheduler()?;
        log::info!("Starting {} listener(s)", scheduler.descriptors.len());
        *lock(&self.scheduler) = Some(tokio::spawn(scheduler.run(None)));
        Ok(())
    }

    /// Poll each listener exactly `polls` times, then wait for the last
    /// dispatches to finish
    ///
    /// Intended for tests and one-shot runs. Returns the poll count per
    /// source queue. [`stop`](Self::stop) ends the run early.
    pub async fn run_bounded(&self, polls: usize) -> ListenerResult<PollCounts> {
        let scheduler = self.take_scheduler()?;
        Ok(scheduler.run(Some(polls)).await)
    }

    /// Signal the scheduler to stop and wait for it and its poll tasks
    ///
    /// No new poll starts once this is called. A receive in progress runs
    /// until it returns (at most `long_poll_seconds`) and its batch is
    /// dispatched and acknowledged as usual, so nothing already taken off a
    /// queue is left invisible. Calling this more than once, or before
    /// starting, is harmless.
    pub async fn stop(&self) -> PollCounts {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            log::info!("Stopping listeners; waiting for receives in progress");
        }
        self.stop_tx.send_replace(true);

        let handle = lock(&self.scheduler).take();
        match handle {
            Some(handle) => match handle.await {
                Ok(counts) => counts,
                Err(e) => {
                    log::error!("Listener scheduler ended abnormally: {}", e);
                    PollCounts::new()
                }
            },
            None => PollCounts::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.scheduler)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ListenerOrchestrator {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
        self.abort_tx.send_replace(true);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Scheduler {
    transport: Arc<dyn QueueTransport>,
    settings: OrchestratorSettings,
    descriptors: Vec<ListenerDescriptor>,
    dispatcher: Dispatcher,
    stop: watch::Receiver<bool>,
    abort: watch::Receiver<bool>,
    in_flight: HashMap<String, JoinHandle<TransportResult<usize>>>,
    poll_count: PollCounts,
    suspended_until: HashMap<String, Instant>,
}

impl Scheduler {
    fn new(
        transport: Arc<dyn QueueTransport>,
        settings: OrchestratorSettings,
        descriptors: Vec<ListenerDescriptor>,
        stop: watch::Receiver<bool>,
        abort: watch::Receiver<bool>,
    ) -> Self {
        let poll_count = descriptors
            .iter()
            .map(|d| (d.source_queue_url.clone(), 0))
            .collect();
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&transport)),
            transport,
            settings,
            descriptors,
            stop,
            abort,
            in_flight: HashMap::new(),
            poll_count,
            suspended_until: HashMap::new(),
        }
    }

    async fn run(mut self, requested_polls: Option<usize>) -> PollCounts {
        loop {
            if *self.stop.borrow() {
                break;
            }
            self.reap_finished().await;
            if *self.stop.borrow() {
                break;
            }

            let started = self.start_due_polls(requested_polls);

            if let Some(limit) = requested_polls {
                if self.poll_count.values().all(|&count| count >= limit) {
                    break;
                }
            }
            if started == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.idle_yield) => {}
                    _ = self.stop.changed() => {}
                }
            }
        }

        let remaining: Vec<(String, JoinHandle<TransportResult<usize>>)> =
            self.in_flight.drain().collect();
        for (url, handle) in remaining {
            let result = handle.await;
            self.record_result(&url, result);
        }
        log::debug!("Listener scheduler finished: {:?}", self.poll_count);
        self.poll_count
    }

    fn start_due_polls(&mut self, requested_polls: Option<usize>) -> usize {
        let now = Instant::now();
        let mut started = 0;
        for descriptor in &self.descriptors {
            let url = &descriptor.source_queue_url;
            match self.suspended_until.get(url) {
                Some(deadline) if *deadline > now => continue,
                Some(_) => {
                    log::info!("Resuming listener on {}", url);
                    self.suspended_until.remove(url);
                }
                None => {}
            }
            let count = self.poll_count.entry(url.clone()).or_default();
            if requested_polls.is_some_and(|limit| *count >= limit) {
                continue;
            }
            if self.in_flight.contains_key(url) {
                continue;
            }

            let task = poll_once(
                Arc::clone(&self.transport),
                self.dispatcher.clone(),
                descriptor.clone(),
                self.settings.long_poll_seconds,
                self.abort.clone(),
            );
            self.in_flight.insert(url.clone(), tokio::spawn(task));
            *count += 1;
            started += 1;
        }
        started
    }

    async fn reap_finished(&mut self) {
        let finished: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(url, _)| url.clone())
            .collect();
        for url in finished {
            if let Some(handle) = self.in_flight.remove(&url) {
                let result = handle.await;
                self.record_result(&url, result);
            }
        }
    }

    fn record_result(
        &mut self,
        url: &str,
        result: Result<TransportResult<usize>, tokio::task::JoinError>,
    ) {
        let failure = match result {
            Ok(Ok(processed)) => {
                log::trace!("Poll on {} handled {} message(s)", url, processed);
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("poll task ended abnormally: {}", e),
        };
        log::error!(
            "Listener on {} suspended for {:?}: {}",
            url,
            self.settings.failure_suspension,
            failure
        );
        self.suspended_until
            .insert(url.to_string(), Instant::now() + self.settings.failure_suspension);
    }
}

/// One receive and the dispatch of whatever it returned
async fn poll_once(
    transport: Arc<dyn QueueTransport>,
    dispatcher: Dispatcher,
    descriptor: ListenerDescriptor,
    long_poll_seconds: u64,
    mut abort: watch::Receiver<bool>,
) -> TransportResult<usize> {
    let url = descriptor.source_queue_url.as_str();
    let batch = tokio::select! {
        received = transport.receive(url, descriptor.max_batch, long_poll_seconds) => received?,
        _ = abort.wait_for(|abort| *abort) => return Ok(0),
    };
    if batch.is_empty() {
        return Ok(0);
    }
    let summary = dispatcher.dispatch(&descriptor, batch).await;
    Ok(summary.processed)
}

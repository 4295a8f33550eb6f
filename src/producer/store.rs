//! Correlation store
//!
//! Maps correlation tokens to one-shot reply slots. A caller registers its
//! token before the request leaves, then awaits the slot; the broker's polling
//! loop publishes replies into it as they arrive on the response queue.
//!
//! Replies that arrive for a token with no slot (after its waiter timed out,
//! or before it registered) are held for a grace period so a late `register`
//! can still claim them, then dropped.
//!
//! A slot lives until its waiter is done with it: awaiting removes it on
//! return and also when the awaiting future is dropped part way through.
//!
//! The single-flight polling flag lives under the same lock as the slot map,
//! so "no waiters left, stop polling" and "new waiter, start polling if
//! nobody is" cannot interleave badly.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::producer::error::{BrokerError, BrokerResult};
use crate::producer::token::CorrelationToken;

/// Default lifetime of a reply nobody was waiting for
pub const DEFAULT_ORPHAN_TTL: Duration = Duration::from_secs(60);

struct Slot {
    sender: Option<oneshot::Sender<String>>,
    receiver: Option<oneshot::Receiver<String>>,
}

struct Orphan {
    body: String,
    expires_at: Instant,
}

#[derive(Default)]
struct StoreState {
    slots: HashMap<CorrelationToken, Slot>,
    orphans: HashMap<CorrelationToken, Orphan>,
    polling_in_flight: bool,
}

impl StoreState {
    fn purge_expired(&mut self, now: Instant) {
        self.orphans.retain(|_, orphan| orphan.expires_at > now);
    }
}

/// Thread-safe token to reply rendezvous
pub struct CorrelationStore {
    state: Mutex<StoreState>,
    orphan_ttl: Duration,
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new(DEFAULT_ORPHAN_TTL)
    }
}

/// Removes a slot when its waiter returns or is dropped mid-wait
struct SlotRelease<'a> {
    store: &'a CorrelationStore,
    token: &'a CorrelationToken,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.store.lock().slots.remove(self.token);
    }
}

impl CorrelationStore {
    /// A zero `orphan_ttl` drops unclaimed replies immediately
    pub fn new(orphan_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            orphan_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty slot for `token`
    ///
    /// A buffered orphan reply for the same token is moved straight into the
    /// new slot.
    pub fn register(&self, token: CorrelationToken) -> BrokerResult<()> {
        let mut state = self.lock();
        if state.slots.contains_key(&token) {
            return Err(BrokerError::DuplicateToken { token });
        }
        state.purge_expired(Instant::now());

        let (sender, receiver) = oneshot::channel();
        let sender = match state.orphans.remove(&token) {
            Some(orphan) => {
                log::debug!("Claimed buffered reply for {}", token);
                let _ = sender.send(orphan.body);
                None
            }
            None => Some(sender),
        };
        state.slots.insert(
            token,
            Slot {
                sender,
                receiver: Some(receiver),
            },
        );
        Ok(())
    }

    /// Deliver `body` to the waiter for `token`, or buffer it
    ///
    /// Returns true when the body went to a live waiter.
    pub fn publish(&self, token: CorrelationToken, body: String) -> bool {
        let mut state = self.lock();
        let now = Instant::now();
        state.purge_expired(now);

        let undelivered = match state.slots.get_mut(&token) {
            Some(slot) => match slot.sender.take() {
                Some(sender) => match sender.send(body) {
                    Ok(()) => return true,
                    Err(body) => {
                        // Waiter went away without removing its slot
                        state.slots.remove(&token);
                        body
                    }
                },
                None => {
                    log::debug!("Duplicate reply for {} ignored", token);
                    return false;
                }
            },
            None => body,
        };

        if self.orphan_ttl.is_zero() {
            log::debug!("Dropping reply for {}: nobody is waiting", token);
        } else {
            log::debug!(
                "Buffering reply for {} for {:?}: nobody is waiting",
                token,
                self.orphan_ttl
            );
            state.orphans.insert(
                token,
                Orphan {
                    body: undelivered,
                    expires_at: now + self.orphan_ttl,
                },
            );
        }
        false
    }

    /// Wait up to `timeout` for the reply to `token`
    ///
    /// Returns `None` on timeout, on cancellation and when `token` has no
    /// slot or is already being awaited. The slot is gone once this returns,
    /// or once the returned future is dropped.
    pub async fn await_reply(&self, token: &CorrelationToken, timeout: Duration) -> Option<String> {
        let receiver = {
            let mut state = self.lock();
            match state.slots.get_mut(token) {
                Some(slot) => slot.receiver.take(),
                None => None,
            }
        };
        let Some(mut receiver) = receiver else {
            log::warn!("No reply slot available for {}", token);
            return None;
        };
        let _release = SlotRelease { store: self, token };

        let reply = match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(body)) => Some(body),
            Ok(Err(_)) => None,
            // A reply may have landed right at the deadline
            Err(_) => receiver.try_recv().ok(),
        };

        if reply.is_none() {
            log::debug!("No reply for {} within {:?}", token, timeout);
        }
        reply
    }

    /// Remove the slot for `token`; a current waiter sees `None`
    pub fn cancel(&self, token: &CorrelationToken) -> bool {
        self.lock().slots.remove(token).is_some()
    }

    /// Remove every slot and buffered reply, returning how many slots there were
    pub fn cancel_all(&self) -> usize {
        let mut state = self.lock();
        state.orphans.clear();
        let count = state.slots.len();
        state.slots.clear();
        count
    }

    /// Number of tokens currently holding a slot
    pub fn pending_count(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn has_waiters(&self) -> bool {
        !self.lock().slots.is_empty()
    }

    /// Number of replies held without a waiter, after expiry
    pub fn orphan_count(&self) -> usize {
        let mut state = self.lock();
        state.purge_expired(Instant::now());
        state.orphans.len()
    }

    /// Claim the polling role; false if a poller is already running
    pub fn try_begin_polling(&self) -> bool {
        let mut state = self.lock();
        if state.polling_in_flight {
            false
        } else {
            state.polling_in_flight = true;
            true
        }
    }

    /// Release the polling role if no slots remain
    ///
    /// Returns true when the caller should stop polling.
    pub fn finish_polling_if_idle(&self) -> bool {
        let mut state = self.lock();
        if state.slots.is_empty() {
            state.polling_in_flight = false;
            true
        } else {
            false
        }
    }

    /// Release the polling role unconditionally
    pub fn end_polling(&self) {
        self.lock().polling_in_flight = false;
    }

    pub fn is_polling(&self) -> bool {
        self.lock().polling_in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_twice_fails() {
        let store = CorrelationStore::default();
        let token = CorrelationToken::new();

        store.register(token.clone()).unwrap();
        assert_eq!(
            store.register(token.clone()),
            Err(BrokerError::DuplicateToken { token })
        );
    }

    #[tokio::test]
    async fn test_publish_wakes_waiter_promptly() {
        let store = Arc::new(CorrelationStore::default());
        let token = CorrelationToken::new();
        store.register(token.clone()).unwrap();

        let waiter = {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move { store.await_reply(&token, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let published = std::time::Instant::now();
        assert!(store.publish(token.clone(), "pong".to_string()));

        let reply = waiter.await.unwrap();
        assert_eq!(reply.as_deref(), Some("pong"));
        assert!(published.elapsed() < Duration::from_millis(50));
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_none_and_clears_slot() {
        let store = CorrelationStore::default();
        let token = CorrelationToken::new();
        store.register(token.clone()).unwrap();

        let started = Instant::now();
        let reply = store.await_reply(&token, Duration::from_secs(1)).await;

        assert_eq!(reply, None);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_buffered_then_expires() {
        let store = CorrelationStore::new(Duration::from_secs(60));
        let token = CorrelationToken::new();
        store.register(token.clone()).unwrap();
        assert_eq!(store.await_reply(&token, Duration::from_millis(10)).await, None);

        assert!(!store.publish(token.clone(), "late".to_string()));
        assert_eq!(store.orphan_count(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.orphan_count(), 0);
    }

    #[tokio::test]
    async fn test_early_reply_is_claimed_by_register() {
        let store = CorrelationStore::default();
        let token = CorrelationToken::new();

        assert!(!store.publish(token.clone(), "early".to_string()));
        store.register(token.clone()).unwrap();

        let reply = store.await_reply(&token, Duration::from_millis(100)).await;
        assert_eq!(reply.as_deref(), Some("early"));
        assert_eq!(store.orphan_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_drops_unclaimed_replies() {
        let store = CorrelationStore::new(Duration::ZERO);

        store.publish(CorrelationToken::new(), "lost".to_string());
        assert_eq!(store.orphan_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_keeps_first_body() {
        let store = CorrelationStore::default();
        let token = CorrelationToken::new();
        store.register(token.clone()).unwrap();

        assert!(store.publish(token.clone(), "first".to_string()));
        assert!(!store.publish(token.clone(), "second".to_string()));

        let reply = store.await_reply(&token, Duration::from_millis(100)).await;
        assert_eq!(reply.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_cancel_all_wakes_waiters_empty() {
        let store = Arc::new(CorrelationStore::default());
        let tokens: Vec<CorrelationToken> = (0..3).map(|_| CorrelationToken::new()).collect();
        for token in &tokens {
            store.register(token.clone()).unwrap();
        }

        let waiters: Vec<_> = tokens
            .iter()
            .cloned()
            .map(|token| {
                let store = store.clone();
                tokio::spawn(async move { store.await_reply(&token, Duration::from_secs(30)).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.cancel_all(), 3);
        for waiter in waiters {
            let reply = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reply, None);
        }
    }

    #[tokio::test]
    async fn test_dropped_waiter_releases_slot() {
        let store = CorrelationStore::default();
        let token = CorrelationToken::new();
        store.register(token.clone()).unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            store.await_reply(&token, Duration::from_secs(30)),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(store.pending_count(), 0);

        assert!(!store.publish(token.clone(), "too late".to_string()));
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.orphan_count(), 1);
    }

    #[test]
    fn test_publish_to_abandoned_receiver_removes_slot() {
        let store = CorrelationStore::default();
        let token = CorrelationToken::new();
        store.register(token.clone()).unwrap();
        // Receiver taken and dropped without the slot being removed
        drop(store.lock().slots.get_mut(&token).unwrap().receiver.take());

        assert!(!store.publish(token, "nobody".to_string()));
        assert_eq!(store.pending_count(), 0);
        assert!(store.finish_polling_if_idle());
    }

    #[tokio::test]
    async fn test_unregistered_await_returns_none() {
        let store = CorrelationStore::default();
        let reply = store
            .await_reply(&CorrelationToken::new(), Duration::from_secs(5))
            .await;
        assert_eq!(reply, None);
    }

    #[test]
    fn test_polling_flag_is_single_flight() {
        let store = CorrelationStore::default();

        assert!(store.try_begin_polling());
        assert!(!store.try_begin_polling());

        store.register(CorrelationToken::new()).unwrap();
        assert!(!store.finish_polling_if_idle());
        assert!(store.is_polling());

        store.cancel_all();
        assert!(store.finish_polling_if_idle());
        assert!(!store.is_polling());
        assert!(store.try_begin_polling());
    }
}

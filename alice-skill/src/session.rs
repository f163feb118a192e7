//! Per-conversation state and its bounded, expiring store.
//!
//! Sessions live in a [`DashMap`] keyed by the platform's session id. Each
//! session carries a last-access stamp; entries idle longer than the TTL are
//! dropped lazily on lookup and by a periodic sweep. When the store is full,
//! the least recently used entries are evicted first (approximate: the scan
//! is not atomic with concurrent inserts).

use crate::oracle::Reply;
use crate::pending::PendingReply;
use alice_common::config::SessionsConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::MutexGuard;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Session store construction error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid session store configuration: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// Session
// ============================================================================

/// Outcome of checking a session's in-flight slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InFlight {
    /// Nothing was in flight.
    Idle,
    /// A computation is running.
    Pending,
    /// The computation finished; its reply has been consumed.
    Ready(Reply),
}

/// Mutable session fields. Only reachable through [`Session::try_claim`].
#[derive(Debug, Default)]
pub struct SessionState {
    continuation_token: String,
    in_flight: Option<PendingReply>,
}

impl SessionState {
    pub fn continuation_token(&self) -> &str {
        &self.continuation_token
    }

    pub fn is_awaiting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Park a freshly started computation. Hands it back if one is already
    /// in flight.
    pub fn register(&mut self, pending: PendingReply) -> Result<(), PendingReply> {
        if self.in_flight.is_some() {
            return Err(pending);
        }
        self.in_flight = Some(pending);
        Ok(())
    }

    /// Non-blocking check of the in-flight slot.
    pub fn poll_in_flight(&mut self) -> InFlight {
        let taken = match self.in_flight.as_mut() {
            None => return InFlight::Idle,
            Some(pending) => pending.try_take(),
        };
        match taken {
            Some(reply) => InFlight::Ready(self.consume(reply)),
            None => InFlight::Pending,
        }
    }

    /// Wait up to `bound` for the in-flight computation.
    pub async fn wait_in_flight(&mut self, bound: Duration) -> InFlight {
        let taken = match self.in_flight.as_mut() {
            None => return InFlight::Idle,
            Some(pending) => pending.wait(bound).await,
        };
        match taken {
            Some(reply) => InFlight::Ready(self.consume(reply)),
            None => InFlight::Pending,
        }
    }

    fn consume(&mut self, reply: Reply) -> Reply {
        if let Some(pending) = self.in_flight.take() {
            tracing::debug!(
                elapsed_ms = pending.elapsed().as_millis() as u64,
                "Consumed in-flight reply"
            );
        }
        self.continuation_token = reply.continuation_token.clone();
        reply
    }
}

/// Point-in-time copy of a session's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub continuation_token: String,
    pub awaiting: bool,
}

/// One conversation.
#[derive(Debug)]
pub struct Session {
    id: String,
    state: tokio::sync::Mutex<SessionState>,
    /// Milliseconds since the owning store's epoch.
    last_access_ms: AtomicU64,
}

impl Session {
    fn new(id: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: id.into(),
            state: tokio::sync::Mutex::new(SessionState::default()),
            last_access_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Take exclusive ownership of the session's fields without waiting.
    ///
    /// `None` means another turn currently owns the session, which only
    /// happens while that turn waits on its own computation.
    pub fn try_claim(&self) -> Option<MutexGuard<'_, SessionState>> {
        self.state.try_lock().ok()
    }

    /// Copy of the current fields; waits for any turn holding the session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            continuation_token: state.continuation_token.clone(),
            awaiting: state.is_awaiting(),
        }
    }

    fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    fn touch(&self, now_ms: u64) {
        self.last_access_ms.fetch_max(now_ms, Ordering::Relaxed);
    }
}

// ============================================================================
// SessionStore
// ============================================================================

/// Size- and time-bounded map from session id to [`Session`].
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    ttl: Duration,
    max_entries: usize,
    sweep_interval: Duration,
    epoch: Instant,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    /// Create a store from configuration.
    pub fn new(config: &SessionsConfig) -> Result<Self, StoreError> {
        Self::with_limits(config.ttl(), config.max_entries, config.sweep_interval())
    }

    /// Create a store with explicit limits.
    pub fn with_limits(
        ttl: Duration,
        max_entries: usize,
        sweep_interval: Duration,
    ) -> Result<Self, StoreError> {
        if ttl.is_zero() {
            return Err(StoreError::InvalidConfig("ttl must be greater than 0".into()));
        }
        if max_entries == 0 {
            return Err(StoreError::InvalidConfig(
                "max_entries must be greater than 0".into(),
            ));
        }
        if sweep_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "sweep interval must be greater than 0".into(),
            ));
        }

        Ok(Self {
            sessions: DashMap::new(),
            ttl,
            max_entries,
            sweep_interval,
            epoch: Instant::now(),
            sweeper: Mutex::new(None),
        })
    }

    /// Return the live session for `id`, creating a fresh one if it is
    /// missing or expired.
    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        let now = self.now_ms();

        if let Some(entry) = self.sessions.get(id) {
            if !self.is_expired(entry.value(), now) {
                entry.touch(now);
                return entry.value().clone();
            }
        }

        if self.sessions.len() >= self.max_entries && !self.sessions.contains_key(id) {
            self.make_room(now);
        }

        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.is_expired(entry.get(), now) {
                    tracing::debug!(session_id = %id, "Replacing expired session");
                    let fresh = Arc::new(Session::new(id, now));
                    entry.insert(fresh.clone());
                    fresh
                } else {
                    entry.get().touch(now);
                    entry.get().clone()
                }
            }
            Entry::Vacant(entry) => {
                tracing::debug!(session_id = %id, "Created session");
                let fresh = Arc::new(Session::new(id, now));
                entry.insert(fresh.clone());
                fresh
            }
        }
    }

    /// Return the live session for `id` without creating one. The session's
    /// lifetime is left as is; see [`SessionStore::touch`].
    pub fn peek(&self, id: &str) -> Option<Arc<Session>> {
        let now = self.now_ms();
        self.sessions
            .remove_if(id, |_, session| self.is_expired(session, now));

        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Mark `session` as used now, restarting its idle window.
    pub fn touch(&self, session: &Session) {
        session.touch(self.now_ms());
    }

    /// Number of tracked sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.now_ms();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !self.is_expired(session, now));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.sessions.len(), "Swept expired sessions");
        }
        removed
    }

    /// Start the periodic expiry sweep. Calling it again is a no-op.
    pub fn start_sweeper(self: &Arc<Self>) {
        let Ok(mut slot) = self.sweeper.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }

        let store: Weak<Self> = Arc::downgrade(self);
        let interval = self.sweep_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.sweep();
            }
        }));

        tracing::info!(
            ttl_secs = self.ttl.as_secs(),
            max_entries = self.max_entries,
            sweep_interval_secs = interval.as_secs(),
            "Session sweeper started"
        );
    }

    /// Stop the sweeper and drop all sessions. Background computations of
    /// dropped sessions finish unobserved.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        let dropped = self.sessions.len();
        self.sessions.clear();
        tracing::info!(dropped, "Session store shut down");
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn is_expired(&self, session: &Session, now_ms: u64) -> bool {
        now_ms.saturating_sub(session.last_access_ms()) > self.ttl.as_millis() as u64
    }

    /// Free at least one slot: expired entries first, then a batch of the
    /// least recently used ones.
    fn make_room(&self, now_ms: u64) {
        self.sessions
            .retain(|_, session| !self.is_expired(session, now_ms));

        let len = self.sessions.len();
        if len < self.max_entries {
            return;
        }

        let mut by_age: Vec<(String, u64)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_access_ms()))
            .collect();

        let evict = (len + 1 - self.max_entries)
            .max(self.eviction_batch())
            .min(by_age.len());
        if evict < by_age.len() {
            by_age.select_nth_unstable_by_key(evict, |(_, last_access)| *last_access);
        }

        for (id, _) in by_age.into_iter().take(evict) {
            self.sessions.remove(&id);
        }
        tracing::debug!(
            evicted = evict,
            remaining = self.sessions.len(),
            "Evicted least recently used sessions over capacity"
        );
    }

    /// Sessions dropped per capacity eviction: a tenth of the budget.
    fn eviction_batch(&self) -> usize {
        (self.max_entries / 10).max(1)
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl_secs: u64, max_entries: usize) -> SessionStore {
        SessionStore::with_limits(
            Duration::from_secs(ttl_secs),
            max_entries,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_limits_fail_to_initialise() {
        let zero_ttl = SessionStore::with_limits(Duration::ZERO, 10, Duration::from_secs(1));
        assert!(matches!(zero_ttl, Err(StoreError::InvalidConfig(_))));

        let zero_capacity =
            SessionStore::with_limits(Duration::from_secs(60), 0, Duration::from_secs(1));
        assert!(matches!(zero_capacity, Err(StoreError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_create_returns_same_session() {
        let store = store(60, 10);
        let first = store.get_or_create("s1");
        let second = store.get_or_create("s1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
        assert_eq!(first.id(), "s1");
        assert_eq!(
            first.snapshot().await,
            SessionSnapshot {
                continuation_token: String::new(),
                awaiting: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_is_replaced() {
        let store = store(60, 10);
        let first = store.get_or_create("s1");

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(store.peek("s1").is_none());
        let second = store.get_or_create("s1");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_extends_lifetime() {
        let store = store(60, 10);
        let first = store.get_or_create("s1");

        tokio::time::advance(Duration::from_secs(40)).await;
        store.get_or_create("s1");
        tokio::time::advance(Duration::from_secs(40)).await;

        let again = store.get_or_create("s1");
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_does_not_create() {
        let store = store(60, 10);
        assert!(store.peek("missing").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let store = store(600, 2);
        store.get_or_create("a");
        tokio::time::advance(Duration::from_secs(1)).await;
        store.get_or_create("b");
        tokio::time::advance(Duration::from_secs(1)).await;
        store.get_or_create("a");
        tokio::time::advance(Duration::from_secs(1)).await;

        store.get_or_create("c");

        assert_eq!(store.len(), 2);
        assert!(store.peek("a").is_some());
        assert!(store.peek("b").is_none());
        assert!(store.peek("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_does_not_extend_lifetime() {
        let store = store(60, 10);
        let first = store.get_or_create("s1");

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(store.peek("s1").is_some());
        tokio::time::advance(Duration::from_secs(21)).await;
        assert!(store.peek("s1").is_none());

        let second = store.get_or_create("s1");
        tokio::time::advance(Duration::from_secs(40)).await;
        store.touch(&second);
        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(store.peek("s1").is_some());
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_in_batches() {
        let store = store(600, 20);
        for i in 0..20 {
            store.get_or_create(&format!("s{i}"));
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        store.get_or_create("new");

        assert_eq!(store.len(), 19);
        assert!(store.peek("s0").is_none());
        assert!(store.peek("s1").is_none());
        assert!(store.peek("s2").is_some());
        assert!(store.peek("new").is_some());

        // Room is left, so the next id evicts nothing.
        store.get_or_create("another");
        assert_eq!(store.len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_prefers_expired_entries() {
        let store = store(10, 2);
        store.get_or_create("old");
        tokio::time::advance(Duration::from_secs(11)).await;
        store.get_or_create("fresh");

        store.get_or_create("new");
        assert!(store.peek("fresh").is_some());
        assert!(store.peek("new").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_idle_sessions() {
        let store = Arc::new(store(5, 10));
        store.get_or_create("s1");
        store.start_sweeper();

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(store.is_empty());

        store.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_get_or_create_agrees() {
        let store = Arc::new(store(60, 100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get_or_create("shared") })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = store(60, 10);
        let session = store.get_or_create("s1");

        let guard = session.try_claim().unwrap();
        assert!(session.try_claim().is_none());
        drop(guard);
        assert!(session.try_claim().is_some());
    }

    #[tokio::test]
    async fn test_state_consumes_reply_once() {
        let mut state = SessionState::default();
        assert_eq!(state.poll_in_flight(), InFlight::Idle);

        let (tx, pending) = PendingReply::channel("gone");
        state.register(pending).unwrap();

        let (_tx2, second) = PendingReply::channel("gone");
        assert!(state.register(second).is_err());
        assert_eq!(state.poll_in_flight(), InFlight::Pending);

        tx.send(Reply::new("answer", "resp_1"));
        assert_eq!(
            state.poll_in_flight(),
            InFlight::Ready(Reply::new("answer", "resp_1"))
        );
        assert_eq!(state.continuation_token(), "resp_1");
        assert!(!state.is_awaiting());
        assert_eq!(state.poll_in_flight(), InFlight::Idle);
    }
}

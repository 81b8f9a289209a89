//! Pending interactions.
//!
//! When the bot asks a question (for example "which of these functions did
//! you mean?") it parks a continuation here under the message id of the
//! question it sent. A later message that replies to that id resumes the
//! continuation.
//!
//! Entries expire after a TTL. Expiry is lazy: an expired entry is dropped
//! the next time it is looked up. [`PendingStore::sweep_expired`] can also
//! be called periodically to bound memory under churn.
//!
//! Time is read from [`tokio::time::Instant`], so tests can drive expiry
//! with a paused clock.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::context::DispatchContext;

/// Default time a pending interaction stays live.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(300);

/// Opaque payload stored next to a continuation.
pub type CandidateData = Box<dyn Any + Send + Sync>;

/// Future returned by a continuation.
pub type ContinuationFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A suspended step, resumed with the context of the correlated reply.
pub type Continuation =
    Box<dyn FnOnce(Arc<DispatchContext>, CandidateData) -> ContinuationFuture + Send>;

/// One parked continuation.
struct PendingInteraction {
    continuation: Continuation,
    data: CandidateData,
    created_at: Instant,
    expires_at: Instant,
}

impl PendingInteraction {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A time-bounded map from correlation key to continuation.
///
/// Operations take one short lock and never hold it across an await.
pub struct PendingStore {
    entries: Mutex<HashMap<i64, PendingInteraction>>,
    default_ttl: Duration,
}

impl Default for PendingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingStore {
    /// Creates a store with [`DEFAULT_PENDING_TTL`].
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_PENDING_TTL)
    }

    /// Creates a store with a custom default TTL.
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// The TTL used when `put` is given none.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Parks `continuation` under `key`.
    ///
    /// Unconditional upsert: an existing entry under the same key is
    /// replaced. Returns `true` if one was.
    pub fn put(
        &self,
        key: i64,
        continuation: Continuation,
        data: CandidateData,
        ttl: Option<Duration>,
    ) -> bool {
        let now = Instant::now();
        let entry = PendingInteraction {
            continuation,
            data,
            created_at: now,
            expires_at: now + ttl.unwrap_or(self.default_ttl),
        };

        let replaced = self.entries.lock().insert(key, entry).is_some();
        if replaced {
            debug!(key, "Replaced pending interaction");
        } else {
            trace!(key, "Registered pending interaction");
        }
        replaced
    }

    /// Parks an async closure under `key`, boxing it.
    pub fn register<F, Fut>(
        &self,
        key: i64,
        data: impl Any + Send + Sync,
        ttl: Option<Duration>,
        continuation: F,
    ) -> bool
    where
        F: FnOnce(Arc<DispatchContext>, CandidateData) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.put(
            key,
            Box::new(move |ctx, data| continuation(ctx, data).boxed()),
            Box::new(data),
            ttl,
        )
    }

    /// Removes and returns the entry under `key` if it is still live.
    ///
    /// An expired entry is removed as well, and reported as absent.
    pub fn take(&self, key: i64) -> Option<(Continuation, CandidateData)> {
        let entry = self.entries.lock().remove(&key)?;
        if entry.is_live(Instant::now()) {
            trace!(key, waited = ?entry.created_at.elapsed(), "Took pending interaction");
            Some((entry.continuation, entry.data))
        } else {
            debug!(key, "Pending interaction expired");
            None
        }
    }

    /// Returns `true` if a live entry exists under `key`.
    pub fn contains(&self, key: i64) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(&key)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Swept expired pending interactions");
        }
        removed
    }

    /// Number of stored entries, live or not yet swept.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for PendingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingStore")
            .field("entries", &self.len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

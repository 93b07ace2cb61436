//! In-process session cache.
//!
//! Holds a disposable projection of each user's authorization-relevant
//! fields so request checks can skip the user store. Entries are never
//! updated in place: they are written whole, read until they expire, and
//! then re-derived from the store.
//!
//! # Concurrency
//!
//! Backed by a sharded `DashMap`: operations on unrelated users do not
//! contend. An expired entry is evicted by the reader that observes it, and
//! the eviction re-checks expiry under the shard lock so a concurrent fresh
//! `put` is never thrown away.
//!
//! Every invalidation gets a stamp from a global counter. A reader filling
//! the cache takes a [`FillToken`] before reading the store and writes with
//! [`SessionCache::put_if_unchanged`], which refuses the write if the user
//! was invalidated in between. Without this a fill racing a suspension could
//! put the pre-suspension projection back for a whole ttl.
//!
//! # Lifecycle
//!
//! Construct one `SessionCache` at startup, share it as `Arc<SessionCache>`,
//! optionally start a sweeper with [`SessionCache::spawn_sweeper`] and stop it
//! with [`SweeperHandle::shutdown`].

use crate::constants::{cache_results, metric_names};
use crate::environment::{Clock, SystemClock};
use crate::state::{EmailStatus, LocalUser, UserId, UserStatus};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Cached authorization projection of a [`LocalUser`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCacheEntry {
    /// Internal user ID.
    pub user_id: UserId,

    /// Account status at derivation time.
    pub status: UserStatus,

    /// Email verification status at derivation time.
    pub email_status: EmailStatus,

    /// Absolute expiry of the session this entry describes.
    pub expires_at: DateTime<Utc>,
}

impl SessionCacheEntry {
    /// Derive an entry from a user record.
    #[must_use]
    pub fn from_user(user: &LocalUser, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user.id,
            status: user.status,
            email_status: user.email_status,
            expires_at,
        }
    }

    /// Returns `true` if the account is available.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Available
    }

    /// Returns `true` if the email address has been verified.
    #[must_use]
    pub fn is_email_verified(&self) -> bool {
        self.email_status == EmailStatus::Available
    }

    /// Returns `true` if the session is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Stored entry plus its cache deadline.
#[derive(Debug, Clone)]
struct CachedSession {
    entry: SessionCacheEntry,
    evict_at: DateTime<Utc>,
}

impl CachedSession {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.evict_at || self.entry.is_expired_at(now)
    }
}

/// Per-user map slot.
///
/// Survives invalidation without a session so that a fill that started
/// before the invalidation can still be recognised and dropped.
#[derive(Debug, Clone)]
struct Slot {
    session: Option<CachedSession>,
    /// Stamp of the latest invalidation, 0 if never invalidated.
    invalidated_at: u64,
}

/// Snapshot taken before reading the user store for a cache fill.
///
/// Pass it to [`SessionCache::put_if_unchanged`]; the fill is dropped if the
/// user was invalidated after the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillToken(u64);

/// Concurrent TTL cache of [`SessionCacheEntry`] values keyed by user.
pub struct SessionCache {
    entries: DashMap<UserId, Slot>,
    clock: Arc<dyn Clock>,
    /// Last invalidation stamp handed out.
    epoch: AtomicU64,
    /// Highest invalidation stamp whose slot has been purged.
    purged_floor: AtomicU64,
}

impl SessionCache {
    /// Create an empty cache on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty cache on the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            epoch: AtomicU64::new(0),
            purged_floor: AtomicU64::new(0),
        }
    }

    /// The clock this cache measures expiry against.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Look up a live entry.
    ///
    /// An entry at or past its expiry is a miss and is evicted.
    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<SessionCacheEntry> {
        let now = self.clock.now();

        // Copy out and release the shard guard before any eviction.
        let found = self.entries.get(user_id).and_then(|slot| {
            slot.session
                .as_ref()
                .map(|cached| (cached.is_stale(now), cached.entry.clone()))
        });

        match found {
            None => {
                metrics::counter!(metric_names::SESSION_CACHE, "result" => cache_results::MISS)
                    .increment(1);
                None
            }
            Some((false, entry)) => {
                metrics::counter!(metric_names::SESSION_CACHE, "result" => cache_results::HIT)
                    .increment(1);
                Some(entry)
            }
            Some((true, _)) => {
                self.evict_stale(user_id, now);
                metrics::counter!(metric_names::SESSION_CACHE, "result" => cache_results::EXPIRED)
                    .increment(1);
                tracing::debug!(user_id = %user_id, "Evicted expired session cache entry");
                None
            }
        }
    }

    /// Take a [`FillToken`] before reading the store for a later
    /// [`SessionCache::put_if_unchanged`].
    #[must_use]
    pub fn fill_token(&self) -> FillToken {
        FillToken(self.epoch.load(Ordering::SeqCst))
    }

    /// Store `entry` for `ttl`, replacing any previous entry for the user.
    ///
    /// A ttl reaching past the representable range is clamped.
    pub fn put(&self, user_id: UserId, entry: SessionCacheEntry, ttl: Duration) {
        let cached = self.cached(entry, ttl);
        match self.entries.entry(user_id) {
            Entry::Occupied(mut slot) => slot.get_mut().session = Some(cached),
            Entry::Vacant(slot) => {
                slot.insert(Slot {
                    session: Some(cached),
                    invalidated_at: 0,
                });
            }
        }
    }

    /// Store `entry` for `ttl` unless `user_id` was invalidated after `token`
    /// was taken. Returns `true` if the entry was stored.
    pub fn put_if_unchanged(
        &self,
        user_id: UserId,
        token: FillToken,
        entry: SessionCacheEntry,
        ttl: Duration,
    ) -> bool {
        let cached = self.cached(entry, ttl);
        match self.entries.entry(user_id) {
            Entry::Occupied(mut slot) => {
                if slot.get().invalidated_at > token.0 {
                    return false;
                }
                slot.get_mut().session = Some(cached);
            }
            Entry::Vacant(slot) => {
                // A purged slot may have carried a newer invalidation.
                if self.purged_floor.load(Ordering::SeqCst) > token.0 {
                    return false;
                }
                slot.insert(Slot {
                    session: Some(cached),
                    invalidated_at: 0,
                });
            }
        }
        true
    }

    /// Drop the entry for `user_id`.
    ///
    /// Call whenever the authoritative status or email status changes. Fills
    /// started before this call are discarded.
    pub fn invalidate(&self, user_id: &UserId) {
        let stamp = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.entries.insert(
            *user_id,
            Slot {
                session: None,
                invalidated_at: stamp,
            },
        );
        if previous.is_some_and(|slot| slot.session.is_some()) {
            tracing::debug!(user_id = %user_id, "Invalidated session cache entry");
        }
        metrics::counter!(metric_names::SESSION_CACHE_INVALIDATED).increment(1);
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        self.entries.retain(|_, slot| {
            match &slot.session {
                Some(cached) if !cached.is_stale(now) => return true,
                Some(_) => purged += 1,
                None => {}
            }
            self.purged_floor
                .fetch_max(slot.invalidated_at, Ordering::SeqCst);
            false
        });
        purged
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|slot| slot.session.is_some())
            .count()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, entry: SessionCacheEntry, ttl: Duration) -> CachedSession {
        let evict_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        CachedSession { entry, evict_at }
    }

    /// Drop a stale session, keeping the slot only if it carries an
    /// invalidation stamp.
    fn evict_stale(&self, user_id: &UserId, now: DateTime<Utc>) {
        let is_stale = |slot: &Slot| slot.session.as_ref().is_some_and(|c| c.is_stale(now));

        self.entries
            .remove_if(user_id, |_, slot| slot.invalidated_at == 0 && is_stale(slot));
        if let Some(mut slot) = self.entries.get_mut(user_id) {
            if is_stale(&*slot) {
                slot.session = None;
            }
        }
    }

    /// Start a background task purging expired entries every `every`.
    ///
    /// The task holds only a weak reference and stops on its own once the
    /// cache is dropped. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> SweeperHandle {
        let cache: Weak<Self> = Arc::downgrade(self);
        let every = every.max(std::time::Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let Some(live) = cache.upgrade() else { break };
                        let purged = live.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, remaining = live.len(), "Session cache sweep");
                        }
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

/// Handle to a running cache sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            // The task may already have stopped on its own.
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "Session cache sweeper ended abnormally");
        }
    }

    /// Returns `true` once the sweeper task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

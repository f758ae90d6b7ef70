//! Time-bounded lookup cache with an injected clock.
//!
//! Each run builds its own cache, so nothing is shared between crawls or
//! between tests.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::cell::Cell;

use chrono::TimeDelta;
use log::trace;

use crate::config::HistoryConfig;
use crate::error::HistoryResult;
use crate::time::Timestamp;

/// Source of the current time.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by the operating system.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<Timestamp>,
}

impl ManualClock {
    /// Creates a clock stopped at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self { now: Cell::new(now) }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: Timestamp) {
        self.now.set(now);
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: TimeDelta) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Timestamp,
}

/// Map whose entries expire a fixed time after they were inserted.
///
/// An entry is fresh while `now < inserted_at + ttl`. Stale entries are hidden
/// from [`TtlCache::get`] but only removed by [`TtlCache::purge_expired`].
#[derive(Debug, Clone)]
pub struct TtlCache<K, V, C> {
    clock: C,
    ttl: TimeDelta,
    entries: BTreeMap<K, Entry<V>>,
}

/// Home domain of each node, keyed by public key.
pub type HomeDomainCache<C> = TtlCache<String, Option<String>, C>;

impl<K: Ord, V, C: Clock> TtlCache<K, V, C> {
    /// Creates an empty cache.
    pub fn new(clock: C, ttl: TimeDelta) -> Self {
        Self {
            clock,
            ttl,
            entries: BTreeMap::new(),
        }
    }

    /// Creates an empty cache using the configured home-domain TTL.
    pub fn from_config(clock: C, config: &HistoryConfig) -> HistoryResult<Self> {
        Ok(Self::new(clock, config.cache_ttl()?))
    }

    /// Returns the lifetime of an entry.
    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Returns the value of `key` while it is fresh.
    pub fn get(&self, key: &K) -> Option<&V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| &entry.value)
    }

    /// Stores `value`, replacing any previous entry and restarting its TTL.
    pub fn insert(&mut self, key: K, value: V) {
        let expires_at = self.clock.now() + self.ttl;
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drops stale entries and returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        let purged = before - self.entries.len();
        if purged > 0 {
            trace!("Purged {} expired cache entries", purged);
        }
        purged
    }

    /// Returns the number of stored entries, stale ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

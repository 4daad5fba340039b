//! The composite eviction policy: a size bound (LRU) and a time bound (TTL).

use crate::entry::CacheEntry;
use crate::key::CacheKey;
use crate::metrics::Metrics;
use crate::store::CacheStore;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How an entry's time-to-live is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
  /// `expires_at = created_at + ttl`, fixed at write time.
  #[default]
  Absolute,
  /// Every hit pushes `expires_at` out to `now + ttl`.
  Sliding,
}

/// Describes the reason an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
  /// The entry was removed due to exceeding `max_size`.
  Capacity,
  /// The entry was removed because its time-to-live (TTL) expired.
  Expired,
  /// The entry's weak key object was dropped.
  Reclaimed,
  /// The entry was removed by `invalidate`.
  Invalidated,
  /// The entry was removed by `clear`.
  Cleared,
}

impl fmt::Display for EvictionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EvictionReason::Capacity => write!(f, "evicted due to capacity"),
      EvictionReason::Expired => write!(f, "evicted due to expiration (TTL)"),
      EvictionReason::Reclaimed => write!(f, "key object reclaimed"),
      EvictionReason::Invalidated => write!(f, "manually invalidated"),
      EvictionReason::Cleared => write!(f, "cleared"),
    }
  }
}

/// Entries a policy removed from the store, oldest first.
pub(crate) type Removed<V> = Vec<(CacheKey, CacheEntry<V>)>;

/// The outcome of validating a stored entry before it is served.
#[derive(Debug)]
pub(crate) enum Lookup<V> {
  Hit(Arc<V>),
  Absent,
  /// The entry was present but its TTL elapsed; it has been removed.
  Expired(CacheEntry<V>),
  /// The entry's key object is gone; it has been removed.
  Reclaimed(CacheEntry<V>),
}

/// Decides which entries a `CacheStore` must drop.
#[derive(Debug, Clone)]
pub(crate) struct EvictionPolicy {
  pub(crate) max_size: Option<usize>,
  pub(crate) time_to_live: Option<Duration>,
  pub(crate) expiration: Expiration,
}

impl EvictionPolicy {
  pub(crate) fn new(
    max_size: Option<usize>,
    time_to_live: Option<Duration>,
    expiration: Expiration,
  ) -> Self {
    Self {
      max_size,
      time_to_live,
      expiration,
    }
  }

  /// Validates the entry for `key` before it is returned to a caller.
  ///
  /// Reclaimed and expired entries are removed eagerly and counted as
  /// evictions. A fresh entry becomes the most recently used and, under
  /// sliding expiration, has its deadline pushed out.
  pub(crate) fn on_read<V>(
    &self,
    store: &mut CacheStore<V>,
    key: &CacheKey,
    now: Duration,
    metrics: &Metrics,
  ) -> Lookup<V> {
    let (reclaimed, expired) = match store.get(key) {
      Some(entry) => (entry.is_reclaimed(), entry.is_expired(now)),
      None => return Lookup::Absent,
    };

    if reclaimed {
      Metrics::record(&metrics.evicted_by_reclaim);
      tracing::debug!(?key, reason = %EvictionReason::Reclaimed, "removed entry on read");
      return store.remove(key).map_or(Lookup::Absent, Lookup::Reclaimed);
    }

    if expired {
      Metrics::record(&metrics.evicted_by_ttl);
      tracing::debug!(?key, reason = %EvictionReason::Expired, "removed entry on read");
      return store.remove(key).map_or(Lookup::Absent, Lookup::Expired);
    }

    if let (Expiration::Sliding, Some(ttl)) = (self.expiration, self.time_to_live) {
      if let Some(entry) = store.get_mut(key) {
        entry.refresh(now, ttl);
      }
    }
    store.touch(key);

    match store.get(key) {
      Some(entry) => Lookup::Hit(entry.value()),
      None => Lookup::Absent,
    }
  }

  /// Enforces the size bound after a successful write.
  ///
  /// Expired entries are purged first so they never count toward occupancy;
  /// then least recently used entries are evicted until `len <= max_size`.
  /// Returns every entry removed, expired ones first.
  pub(crate) fn on_write<V>(&self, store: &mut CacheStore<V>, now: Duration, metrics: &Metrics) -> Removed<V> {
    let max_size = match self.max_size {
      Some(max) if store.len() > max => max,
      _ => return Vec::new(),
    };

    let mut removed = self.purge_expired(store, now, metrics);
    while store.len() > max_size {
      match store.pop_oldest() {
        Some((key, entry)) => {
          Metrics::record(&metrics.evicted_by_capacity);
          let age = now.saturating_sub(entry.created_at);
          tracing::debug!(?key, ?age, reason = %EvictionReason::Capacity, "evicted entry");
          removed.push((key, entry));
        }
        None => break,
      }
    }
    removed
  }

  /// Removes every entry whose TTL has elapsed and returns them.
  ///
  /// Entries are visited in expiry order and the walk stops at the first one
  /// still fresh, so the cost is proportional to the number removed.
  pub(crate) fn purge_expired<V>(&self, store: &mut CacheStore<V>, now: Duration, metrics: &Metrics) -> Removed<V> {
    let mut purged = Vec::new();
    if self.time_to_live.is_none() {
      return purged;
    }

    loop {
      let key = match self.next_to_expire(store) {
        Some((key, entry)) if entry.is_expired(now) => key.clone(),
        _ => break,
      };
      match store.remove(&key) {
        Some(entry) => {
          Metrics::record(&metrics.evicted_by_ttl);
          purged.push((key, entry));
        }
        None => break,
      }
    }
    if !purged.is_empty() {
      tracing::debug!(count = purged.len(), reason = %EvictionReason::Expired, "purged entries");
    }
    purged
  }

  /// The entry whose deadline comes first.
  ///
  /// Every entry shares one TTL, so under absolute expiration deadlines follow
  /// write order. Under sliding expiration every hit both refreshes and
  /// touches an entry, so deadlines follow recency.
  fn next_to_expire<'a, V>(&self, store: &'a CacheStore<V>) -> Option<(&'a CacheKey, &'a CacheEntry<V>)> {
    match self.expiration {
      Expiration::Absolute => store.peek_oldest_written(),
      Expiration::Sliding => store.peek_oldest(),
    }
  }
}

use crate::builder::MemoConfig;
use crate::entry::CacheEntry;
use crate::key::{CacheKey, DerivedKey, KeyObject, KeyStrategy};
use crate::loader::{Compute, Failure, LoadFuture, Outcome};
use crate::metrics::Metrics;
use crate::policy::{EvictionPolicy, EvictionReason, Lookup};
use crate::registry::{Flight, InFlightRegistry};
use crate::store::CacheStore;
use crate::task::janitor::Janitor;
use crate::weak::WeakEntryTracker;
use crate::{time, KeyError, TaskSpawner};

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

/// The cached entries and everything needed to maintain them.
///
/// This part of the engine does not depend on the argument or error types, so
/// the janitor thread can own a handle to it.
pub(crate) struct CacheCore<V> {
  pub(crate) store: Mutex<CacheStore<V>>,
  pub(crate) tracker: Option<Mutex<WeakEntryTracker>>,
  pub(crate) policy: EvictionPolicy,
  pub(crate) metrics: Metrics,
}

impl<V> CacheCore<V> {
  pub(crate) fn new(policy: EvictionPolicy, weak: bool) -> Self {
    Self {
      store: Mutex::new(CacheStore::new()),
      tracker: weak.then(|| Mutex::new(WeakEntryTracker::new())),
      policy,
      metrics: Metrics::new(),
    }
  }

  /// Returns the value for `key` if a valid entry exists, counting a hit.
  ///
  /// Absence is not counted here; misses are counted once per call when the
  /// caller reaches the registry.
  pub(crate) fn lookup(&self, key: &CacheKey) -> Option<Arc<V>> {
    let lookup = {
      let mut store = self.store.lock();
      // Read under the lock so deadlines follow the order of store updates.
      let now = time::now_duration();
      self.policy.on_read(&mut store, key, now, &self.metrics)
    };

    match lookup {
      Lookup::Hit(value) => {
        Metrics::record(&self.metrics.hits);
        tracing::trace!(?key, "cache hit");
        Some(value)
      }
      Lookup::Reclaimed(entry) | Lookup::Expired(entry) => {
        self.release(&[(key.clone(), entry)]);
        None
      }
      Lookup::Absent => None,
    }
  }

  /// Checks for a valid entry without touching recency or counters.
  pub(crate) fn contains(&self, key: &CacheKey) -> bool {
    let now = time::now_duration();
    self
      .store
      .lock()
      .get(key)
      .map_or(false, |entry| !entry.is_expired(now) && !entry.is_reclaimed())
  }

  /// Writes a freshly computed value and enforces the size bound.
  ///
  /// Callers hold the registry lock, which orders this write against
  /// `invalidate` and `clear` for the same key.
  pub(crate) fn insert(&self, key: CacheKey, value: Arc<V>, object: Option<KeyObject>) {
    let evicted = {
      let mut store = self.store.lock();
      let now = time::now_duration();
      let entry = CacheEntry::new_at(value, now, self.policy.time_to_live, object.clone());
      store.put(key.clone(), entry);
      self.policy.on_write(&mut store, now, &self.metrics)
    };
    Metrics::record(&self.metrics.inserts);
    tracing::trace!(?key, evicted = evicted.len(), "cached computed value");

    if let (Some(tracker), Some(object)) = (&self.tracker, object) {
      tracker.lock().track(key, object);
    }
    self.release(&evicted);
  }

  pub(crate) fn remove(&self, key: &CacheKey) -> bool {
    let removed = self.store.lock().remove(key);
    match removed {
      Some(entry) => {
        self.release(&[(key.clone(), entry)]);
        true
      }
      None => false,
    }
  }

  pub(crate) fn clear(&self) -> usize {
    let cleared = self.store.lock().clear();
    if let Some(tracker) = &self.tracker {
      tracker.lock().clear();
    }
    cleared
  }

  pub(crate) fn purge_expired(&self) -> usize {
    let purged = {
      let mut store = self.store.lock();
      let now = time::now_duration();
      self.policy.purge_expired(&mut store, now, &self.metrics)
    };
    self.release(&purged);
    purged.len()
  }

  /// Removes the entries whose weak key objects have been dropped.
  pub(crate) fn purge_reclaimed(&self) -> usize {
    let tracker = match &self.tracker {
      Some(tracker) => tracker,
      None => return 0,
    };

    // The tracker lock is released before the store lock is taken.
    let reclaimed = tracker.lock().take_reclaimed();
    if reclaimed.is_empty() {
      return 0;
    }

    let mut store = self.store.lock();
    let mut removed = 0;
    for key in &reclaimed {
      // The entry may already be gone (LRU/TTL), or the address may now belong
      // to a live object cached under the same key.
      if store.get(key).map_or(false, |entry| entry.is_reclaimed()) {
        store.remove(key);
        Metrics::record(&self.metrics.evicted_by_reclaim);
        removed += 1;
      }
    }
    if removed > 0 {
      tracing::debug!(count = removed, reason = %EvictionReason::Reclaimed, "purged entries");
    }
    removed
  }

  pub(crate) fn len(&self) -> usize {
    self.store.lock().len()
  }

  /// Stops watching the key objects of entries that left the store.
  ///
  /// Takes the tracker lock after the store lock has been released. A key
  /// that was written again in the meantime tracks a different handle and is
  /// left alone.
  fn release(&self, removed: &[(CacheKey, CacheEntry<V>)]) {
    let tracker = match &self.tracker {
      Some(tracker) if !removed.is_empty() => tracker,
      _ => return,
    };

    let mut tracker = tracker.lock();
    for (key, entry) in removed {
      if let Some(object) = &entry.key_object {
        tracker.untrack(key, object);
      }
    }
  }
}

/// What a caller must do after the store missed.
pub(crate) enum Begin<V, E> {
  /// The value appeared while the caller was acquiring the registry.
  Cached(Arc<V>),
  /// The caller started the computation and must run it.
  Lead(Arc<LoadFuture<V, E>>),
  /// The caller joined a computation already running.
  Join(Arc<LoadFuture<V, E>>),
}

/// The internal, thread-safe core of a memoized function.
pub(crate) struct MemoShared<A, V, E> {
  pub(crate) core: Arc<CacheCore<V>>,
  pub(crate) registry: InFlightRegistry<V, E>,
  pub(crate) keys: KeyStrategy<A>,
  pub(crate) compute: Compute<A, V, E>,
  pub(crate) spawner: Option<Arc<dyn TaskSpawner>>,
  pub(crate) janitor: Option<Janitor>,
}

impl<A, V, E> fmt::Debug for MemoShared<A, V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoShared")
      .field("keys", &self.keys)
      .field("max_size", &self.core.policy.max_size)
      .field("time_to_live", &self.core.policy.time_to_live)
      .field("expiration", &self.core.policy.expiration)
      .field("stats", &self.core.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<A, V, E> Drop for MemoShared<A, V, E> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.take() {
      janitor.stop();
    }
  }
}

impl<A, V, E> MemoShared<A, V, E> {
  pub(crate) fn config(&self) -> MemoConfig {
    MemoConfig {
      max_size: self.core.policy.max_size,
      time_to_live: self.core.policy.time_to_live,
      expiration: self.core.policy.expiration,
      weak: self.keys.is_identity(),
    }
  }

  pub(crate) fn derive(&self, args: &A) -> Result<DerivedKey, KeyError> {
    self.keys.derive(args)
  }

  /// Double-checks the store under the registry lock, then joins or starts a
  /// computation for `key`. Counts the miss.
  pub(crate) fn begin(&self, key: &CacheKey, leader: Option<ThreadId>) -> Begin<V, E> {
    let mut pending = self.registry.lock();

    // Lock order: registry, then store.
    if let Some(value) = self.core.lookup(key) {
      return Begin::Cached(value);
    }

    Metrics::record(&self.core.metrics.misses);
    match pending.start_or_join(key, leader) {
      Flight::Leader(future) => Begin::Lead(future),
      Flight::Joined(future) => {
        tracing::trace!(?key, "joined in-flight computation");
        Begin::Join(future)
      }
    }
  }

  /// Records that a caller is waiting on another caller's computation.
  pub(crate) fn record_deduped_wait(&self) {
    Metrics::record(&self.core.metrics.deduped_waits);
  }

  /// Publishes the outcome of a computation.
  ///
  /// The registry entry is removed whatever the outcome. A value is written
  /// only if the computation was still registered, so results of invalidated
  /// or cleared computations are handed to their waiters but never cached.
  pub(crate) fn settle(
    &self,
    key: &CacheKey,
    future: &Arc<LoadFuture<V, E>>,
    outcome: Outcome<V, E>,
    object: Option<KeyObject>,
  ) {
    {
      let mut pending = self.registry.lock();
      let registered = pending.finish(key, future);

      match &outcome {
        Ok(value) if registered => self.core.insert(key.clone(), value.clone(), object),
        Ok(_) => {
          tracing::debug!(?key, "key was invalidated while computing; result not cached");
        }
        Err(Failure::Compute(_)) => {
          Metrics::record(&self.core.metrics.failures);
          tracing::debug!(?key, waiters = future.joined(), "computation failed; nothing cached");
        }
        Err(Failure::Abandoned) => {
          Metrics::record(&self.core.metrics.failures);
          tracing::debug!(?key, waiters = future.joined(), "computation abandoned; nothing cached");
        }
      }
    }
    future.complete(outcome);
  }

  /// Removes the entry and any pending bookkeeping for `key`.
  pub(crate) fn invalidate(&self, key: &CacheKey) -> bool {
    let mut pending = self.registry.lock();
    let was_pending = pending.forget(key);
    let removed = self.core.remove(key);
    drop(pending);

    if removed {
      Metrics::record(&self.core.metrics.invalidations);
    }
    if removed || was_pending {
      tracing::debug!(?key, removed, was_pending, reason = %EvictionReason::Invalidated, "invalidated key");
    }
    removed
  }

  pub(crate) fn clear(&self) {
    let mut pending = self.registry.lock();
    let forgotten = pending.forget_all();
    let cleared = self.core.clear();
    drop(pending);
    tracing::debug!(cleared, forgotten, reason = %EvictionReason::Cleared, "cleared cache");
  }
}

impl<A, V, E> MemoShared<A, V, E>
where
  A: Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Starts the computation away from the calling thread.
  ///
  /// Sync computations get a dedicated thread; async computations are spawned
  /// on the configured `TaskSpawner`. Either way, the `Completion` settles the
  /// computation, even if it panics or its task is dropped.
  pub(crate) fn spawn_compute(&self, args: A, completion: Completion<A, V, E>) {
    match &self.compute {
      Compute::Sync(compute) => {
        let compute = compute.clone();
        thread::spawn(move || {
          let result = compute(args);
          completion.settle(result);
        });
      }
      Compute::Async(compute) => match &self.spawner {
        Some(spawner) => {
          let task = compute(args);
          spawner.spawn(Box::pin(async move {
            let result = task.await;
            completion.settle(result);
          }));
        }
        // The builder refuses async computations without a spawner; dropping
        // the completion settles the call as abandoned.
        None => drop(completion),
      },
    }
  }
}

/// Settles a computation exactly once.
///
/// If the computation panics or its task is dropped before producing a result,
/// the guard's `Drop` settles it as abandoned, so the registry never keeps a
/// stale pending marker and waiters are always woken.
pub(crate) struct Completion<A, V, E> {
  shared: Arc<MemoShared<A, V, E>>,
  key: CacheKey,
  future: Arc<LoadFuture<V, E>>,
  object: Option<KeyObject>,
  settled: bool,
}

impl<A, V, E> Completion<A, V, E> {
  pub(crate) fn new(
    shared: Arc<MemoShared<A, V, E>>,
    key: CacheKey,
    future: Arc<LoadFuture<V, E>>,
    object: Option<KeyObject>,
  ) -> Self {
    Self {
      shared,
      key,
      future,
      object,
      settled: false,
    }
  }

  pub(crate) fn settle(mut self, result: Result<V, E>) {
    let outcome = result
      .map(Arc::new)
      .map_err(|err| Failure::Compute(Arc::new(err)));
    self.finish(outcome);
  }

  fn finish(&mut self, outcome: Outcome<V, E>) {
    self.settled = true;
    let object = self.object.take();
    self.shared.settle(&self.key, &self.future, outcome, object);
  }
}

impl<A, V, E> Drop for Completion<A, V, E> {
  fn drop(&mut self) {
    if !self.settled {
      self.finish(Err(Failure::Abandoned));
    }
  }
}

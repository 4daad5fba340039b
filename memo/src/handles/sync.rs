use crate::builder::MemoConfig;
use crate::error::{KeyError, MemoError};
use crate::loader::{into_result, Compute};
use crate::shared::{Begin, Completion, MemoShared};
use crate::{AsyncMemoized, Stats};

use std::fmt;
use std::sync::Arc;
use std::thread;

/// A thread-safe, synchronous memoized function.
///
/// Concurrent calls with the same key share a single computation: one caller
/// runs it, the others block until its outcome is available. Successful values
/// are cached; errors are handed to every waiting caller and never cached.
pub struct Memoized<A, V, E> {
  pub(crate) shared: Arc<MemoShared<A, V, E>>,
}

impl<A, V, E> fmt::Debug for Memoized<A, V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Memoized").field("shared", &self.shared).finish()
  }
}

impl<A, V, E> Memoized<A, V, E>
where
  A: Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Returns the cached value for `args`, computing it on a miss.
  ///
  /// A synchronous computation runs on the calling thread. An asynchronous one
  /// runs on the configured spawner while this thread blocks, so do not call
  /// this from a single-threaded async runtime that must drive it.
  ///
  /// If the computation calls back into this function with the same key on the
  /// same thread, the inner call runs the computation directly and its result
  /// is not cached.
  pub fn call(&self, args: A) -> Result<Arc<V>, MemoError<E>> {
    let derived = self.shared.derive(&args)?;

    // Fast path: no registry lock.
    if let Some(value) = self.shared.core.lookup(&derived.key) {
      return Ok(value);
    }

    let leader = match self.shared.compute {
      Compute::Sync(_) => Some(thread::current().id()),
      Compute::Async(_) => None,
    };

    let future = match self.shared.begin(&derived.key, leader) {
      Begin::Cached(value) => return Ok(value),
      Begin::Join(future) => {
        if let (true, Compute::Sync(compute)) = (future.is_led_by_current_thread(), &self.shared.compute) {
          tracing::debug!(key = ?derived.key, "computation re-entered its own key; not caching the inner call");
          return compute(args)
            .map(Arc::new)
            .map_err(|err| MemoError::Compute(Arc::new(err)));
        }
        self.shared.record_deduped_wait();
        future
      }
      Begin::Lead(future) => {
        let completion = Completion::new(
          Arc::clone(&self.shared),
          derived.key.clone(),
          Arc::clone(&future),
          derived.object,
        );
        match &self.shared.compute {
          Compute::Sync(compute) => completion.settle(compute(args)),
          Compute::Async(_) => self.shared.spawn_compute(args, completion),
        }
        future
      }
    };

    into_result(future.wait(), &derived.key)
  }

  /// Converts this synchronous `Memoized` into an asynchronous `AsyncMemoized`
  /// sharing the same cache.
  pub fn to_async(&self) -> AsyncMemoized<A, V, E> {
    AsyncMemoized {
      shared: self.shared.clone(),
    }
  }
}

impl<A, V, E> Memoized<A, V, E> {
  /// Removes the entry for `args`. Returns `true` if an entry was removed.
  ///
  /// A computation already running for the key keeps running and its waiters
  /// still receive its result, but that result is not cached. The next call
  /// starts a fresh computation.
  pub fn invalidate(&self, args: &A) -> Result<bool, KeyError> {
    let derived = self.shared.derive(args)?;
    Ok(self.shared.invalidate(&derived.key))
  }

  /// Removes every entry and forgets every running computation.
  ///
  /// Counters are not reset.
  pub fn clear(&self) {
    self.shared.clear();
  }

  /// Returns a snapshot of the function's counters.
  pub fn stats(&self) -> Stats {
    self.shared.core.metrics.snapshot()
  }

  /// Returns the number of stored entries, including any expired or reclaimed
  /// entries not yet removed.
  pub fn len(&self) -> usize {
    self.shared.core.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns `true` if a valid entry exists for `args`. Does not count as a
  /// hit or change recency.
  pub fn contains(&self, args: &A) -> Result<bool, KeyError> {
    let derived = self.shared.derive(args)?;
    Ok(self.shared.core.contains(&derived.key))
  }

  /// Removes every expired entry now. Returns how many were removed.
  pub fn purge_expired(&self) -> usize {
    self.shared.core.purge_expired()
  }

  /// Removes every entry whose weak key object has been dropped. Returns how
  /// many were removed. Always zero outside weak mode.
  pub fn purge_reclaimed(&self) -> usize {
    self.shared.core.purge_reclaimed()
  }

  pub fn config(&self) -> MemoConfig {
    self.shared.config()
  }

  /// Returns the number of computations currently in flight.
  pub fn in_flight(&self) -> usize {
    self.shared.registry.len()
  }
}

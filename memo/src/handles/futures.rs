use crate::builder::MemoConfig;
use crate::error::{KeyError, MemoError};
use crate::loader::into_result;
use crate::shared::{Begin, Completion, MemoShared};
use crate::{Memoized, Stats};

use std::fmt;
use std::sync::Arc;

/// A thread-safe, asynchronous memoized function.
///
/// Concurrent calls with the same key await a single computation. The
/// computation runs detached from every caller: an async computation is spawned
/// on the configured `TaskSpawner` and a sync one on its own thread, so
/// dropping a caller's future never cancels work other callers depend on.
pub struct AsyncMemoized<A, V, E> {
  pub(crate) shared: Arc<MemoShared<A, V, E>>,
}

impl<A, V, E> fmt::Debug for AsyncMemoized<A, V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncMemoized").field("shared", &self.shared).finish()
  }
}

impl<A, V, E> AsyncMemoized<A, V, E>
where
  A: Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Returns the cached value for `args`, computing it on a miss.
  ///
  /// A computation that awaits this function again with its own key waits on
  /// itself and never completes; keys must not be re-entered from async
  /// computations.
  pub async fn call(&self, args: A) -> Result<Arc<V>, MemoError<E>> {
    let derived = self.shared.derive(&args)?;

    if let Some(value) = self.shared.core.lookup(&derived.key) {
      return Ok(value);
    }

    let future = match self.shared.begin(&derived.key, None) {
      Begin::Cached(value) => return Ok(value),
      Begin::Join(future) => {
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
        self.shared.spawn_compute(args, completion);
        future
      }
    };

    let outcome = (&*future).await;
    into_result(outcome, &derived.key)
  }

  /// Converts this asynchronous `AsyncMemoized` into a synchronous `Memoized`
  /// sharing the same cache.
  pub fn to_sync(&self) -> Memoized<A, V, E> {
    Memoized {
      shared: self.shared.clone(),
    }
  }
}

// None of these wait on a computation, so they stay synchronous.
impl<A, V, E> AsyncMemoized<A, V, E> {
  /// Removes the entry for `args`. Returns `true` if an entry was removed.
  ///
  /// A computation already running for the key is not cancelled; its waiters
  /// still receive its result, but that result is not cached.
  pub fn invalidate(&self, args: &A) -> Result<bool, KeyError> {
    let derived = self.shared.derive(args)?;
    Ok(self.shared.invalidate(&derived.key))
  }

  /// Removes every entry and forgets every running computation.
  pub fn clear(&self) {
    self.shared.clear();
  }

  pub fn stats(&self) -> Stats {
    self.shared.core.metrics.snapshot()
  }

  pub fn len(&self) -> usize {
    self.shared.core.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains(&self, args: &A) -> Result<bool, KeyError> {
    let derived = self.shared.derive(args)?;
    Ok(self.shared.core.contains(&derived.key))
  }

  pub fn purge_expired(&self) -> usize {
    self.shared.core.purge_expired()
  }

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

use crate::key::CacheKey;
use crate::loader::LoadFuture;

use std::sync::Arc;
use std::thread::ThreadId;

use ahash::{HashMap, HashMapExt};
use parking_lot::{Mutex, MutexGuard};

/// The result of asking the registry for a computation.
pub(crate) enum Flight<V, E> {
  /// No computation was running; the caller must run this one.
  Leader(Arc<LoadFuture<V, E>>),
  /// A computation was already running; the caller waits on it.
  Joined(Arc<LoadFuture<V, E>>),
}

/// Tracks the computations currently running, at most one per key.
pub(crate) struct InFlightRegistry<V, E> {
  pending: Mutex<HashMap<CacheKey, Arc<LoadFuture<V, E>>>>,
}

impl<V, E> InFlightRegistry<V, E> {
  pub(crate) fn new() -> Self {
    Self {
      pending: Mutex::new(HashMap::new()),
    }
  }

  /// Locks the registry. Callers that also need the store must take this lock first.
  pub(crate) fn lock(&self) -> PendingGuard<'_, V, E> {
    PendingGuard {
      pending: self.pending.lock(),
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.pending.lock().len()
  }
}

/// Exclusive access to the pending computations.
pub(crate) struct PendingGuard<'a, V, E> {
  pending: MutexGuard<'a, HashMap<CacheKey, Arc<LoadFuture<V, E>>>>,
}

impl<'a, V, E> PendingGuard<'a, V, E> {
  /// Joins the computation running for `key`, or registers a new one led by `leader`.
  pub(crate) fn start_or_join(&mut self, key: &CacheKey, leader: Option<ThreadId>) -> Flight<V, E> {
    if let Some(existing) = self.pending.get(key) {
      existing.join();
      return Flight::Joined(existing.clone());
    }

    let future = Arc::new(LoadFuture::new(leader));
    self.pending.insert(key.clone(), future.clone());
    Flight::Leader(future)
  }

  /// Removes `future` from the registry if it is still the one registered for `key`.
  ///
  /// Returns `false` if the registration was already dropped by `invalidate` or
  /// `clear`, in which case the result must not be written.
  pub(crate) fn finish(&mut self, key: &CacheKey, future: &Arc<LoadFuture<V, E>>) -> bool {
    match self.pending.get(key) {
      Some(registered) if Arc::ptr_eq(registered, future) => {
        self.pending.remove(key);
        true
      }
      _ => false,
    }
  }

  /// Drops the bookkeeping for `key`. The computation itself keeps running.
  pub(crate) fn forget(&mut self, key: &CacheKey) -> bool {
    self.pending.remove(key).is_some()
  }

  /// Drops the bookkeeping for every key. Returns how many were pending.
  pub(crate) fn forget_all(&mut self) -> usize {
    let count = self.pending.len();
    self.pending.clear();
    count
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn key(n: u64) -> CacheKey {
    CacheKey::from(n)
  }

  #[test]
  fn second_caller_joins_the_first() {
    let registry = InFlightRegistry::<i32, ()>::new();
    let mut guard = registry.lock();

    let leader = match guard.start_or_join(&key(1), None) {
      Flight::Leader(future) => future,
      Flight::Joined(_) => panic!("first caller must lead"),
    };
    match guard.start_or_join(&key(1), None) {
      Flight::Joined(future) => assert!(Arc::ptr_eq(&future, &leader)),
      Flight::Leader(_) => panic!("second caller must join"),
    }
    assert_eq!(leader.joined(), 1);

    // A different key gets its own computation.
    assert!(matches!(guard.start_or_join(&key(2), None), Flight::Leader(_)));
    drop(guard);
    assert_eq!(registry.len(), 2);
  }

  #[test]
  fn finish_removes_only_the_registered_future() {
    let registry = InFlightRegistry::<i32, ()>::new();
    let mut guard = registry.lock();

    let stale = match guard.start_or_join(&key(1), None) {
      Flight::Leader(future) => future,
      Flight::Joined(_) => unreachable!(),
    };
    assert!(guard.forget(&key(1)));

    let fresh = match guard.start_or_join(&key(1), None) {
      Flight::Leader(future) => future,
      Flight::Joined(_) => panic!("forgotten key must start a new computation"),
    };

    assert!(!guard.finish(&key(1), &stale), "stale computation must not write");
    assert!(guard.finish(&key(1), &fresh));
    assert!(!guard.finish(&key(1), &fresh), "finish is not repeatable");
    drop(guard);
    assert_eq!(registry.len(), 0);
  }

  #[test]
  fn forget_all_clears_bookkeeping() {
    let registry = InFlightRegistry::<i32, ()>::new();
    let mut guard = registry.lock();
    for n in 0..3 {
      guard.start_or_join(&key(n), None);
    }
    assert_eq!(guard.forget_all(), 3);
    drop(guard);
    assert_eq!(registry.len(), 0);
  }
}

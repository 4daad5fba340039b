//! Best-effort reclamation of weak-mode entries.
//!
//! Rust has no finalizers, so the tracker keeps a `Weak` handle per key object
//! and a liveness sweep finds the handles whose object has been dropped. The
//! sweep runs on the janitor tick, when `purge_reclaimed` is called, and lazily
//! whenever a reclaimed entry is read.
//!
//! Reclamation timing is never relied upon. A weak-mode cache without
//! `max_size` or a TTL is only bounded by how often sweeps run; callers that
//! need a hard memory bound must configure one of those as well, and should use
//! `invalidate`/`clear` for deterministic removal.

use crate::key::{CacheKey, KeyObject};

use ahash::{HashMap, HashMapExt};

#[derive(Debug, Default)]
pub(crate) struct WeakEntryTracker {
  objects: HashMap<CacheKey, KeyObject>,
}

impl WeakEntryTracker {
  pub(crate) fn new() -> Self {
    Self {
      objects: HashMap::new(),
    }
  }

  /// Starts watching the key object behind `key`.
  pub(crate) fn track(&mut self, key: CacheKey, object: KeyObject) {
    self.objects.insert(key, object);
  }

  /// Stops watching `key` if it is still tracked for `object`.
  pub(crate) fn untrack(&mut self, key: &CacheKey, object: &KeyObject) {
    if self.objects.get(key).map_or(false, |tracked| tracked.ptr_eq(object)) {
      self.objects.remove(key);
    }
  }

  /// Stops watching every object whose owners are all gone and returns their keys.
  pub(crate) fn take_reclaimed(&mut self) -> Vec<CacheKey> {
    let mut reclaimed = Vec::new();
    self.objects.retain(|key, object| {
      if object.strong_count() == 0 {
        reclaimed.push(key.clone());
        false
      } else {
        true
      }
    });
    reclaimed
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.objects.len()
  }

  pub(crate) fn clear(&mut self) {
    self.objects.clear();
  }
}

use crate::key::KeyObject;

use std::sync::Arc;
use std::time::Duration;

/// A cached result, holding the value and its lifetime metadata.
///
/// Its recency rank is its position in the `CacheStore` ordering.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  /// The computed value, wrapped in an Arc for shared ownership.
  pub(crate) value: Arc<V>,
  /// When the entry was written, as a `Duration` since the engine epoch.
  pub(crate) created_at: Duration,
  /// When the entry stops being served. `None` means no TTL.
  pub(crate) expires_at: Option<Duration>,
  /// Weak handle to the key object in weak mode.
  pub(crate) key_object: Option<KeyObject>,
}

impl<V> CacheEntry<V> {
  /// Creates a new `CacheEntry` stamped with the current time.
  #[cfg(test)]
  pub(crate) fn new(value: Arc<V>, ttl: Option<Duration>, key_object: Option<KeyObject>) -> Self {
    Self::new_at(value, crate::time::now_duration(), ttl, key_object)
  }

  /// Creates a new `CacheEntry` written at `now`.
  pub(crate) fn new_at(
    value: Arc<V>,
    now: Duration,
    ttl: Option<Duration>,
    key_object: Option<KeyObject>,
  ) -> Self {
    Self {
      value,
      created_at: now,
      expires_at: ttl.map(|d| now + d),
      key_object,
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  /// Checks if the entry's TTL has elapsed at `now`.
  #[inline]
  pub(crate) fn is_expired(&self, now: Duration) -> bool {
    matches!(self.expires_at, Some(expires_at) if now >= expires_at)
  }

  /// Checks if the entry's key object has been dropped by every owner.
  #[inline]
  pub(crate) fn is_reclaimed(&self) -> bool {
    matches!(&self.key_object, Some(object) if object.strong_count() == 0)
  }

  /// Pushes the expiration out to `now + ttl` (sliding expiration).
  #[inline]
  pub(crate) fn refresh(&mut self, now: Duration, ttl: Duration) {
    self.expires_at = Some(now + ttl);
  }
}

use crate::error::{BuildError, KeyError};
use crate::handles::{AsyncMemoized, Memoized};
use crate::key::{CacheKey, KeyStrategy};
use crate::loader::Compute;
use crate::policy::{EvictionPolicy, Expiration};
use crate::registry::InFlightRegistry;
use crate::shared::{CacheCore, MemoShared};
use crate::task::janitor::Janitor;
use crate::TaskSpawner;

use core::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;

const DEFAULT_JANITOR_TICK: Duration = Duration::from_secs(1);

/// An immutable summary of how a memoized function was configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoConfig {
  /// The most entries kept at once, or `None` for unbounded.
  pub max_size: Option<usize>,
  /// How long an entry stays valid, or `None` for no time bound.
  pub time_to_live: Option<Duration>,
  /// How `time_to_live` is measured.
  pub expiration: Expiration,
  /// Whether entries are keyed on the identity of a weakly held key object.
  pub weak: bool,
}

/// A builder for creating `Memoized` and `AsyncMemoized` functions.
///
/// ```
/// use fibre_memo::MemoBuilder;
/// use std::convert::Infallible;
///
/// let add = MemoBuilder::new()
///   .max_size(2)
///   .build(|(a, b): (i32, i32)| Ok::<_, Infallible>(a + b))
///   .unwrap();
///
/// assert_eq!(*add.call((1, 2)).unwrap(), 3);
/// assert_eq!(*add.call((1, 2)).unwrap(), 3);
/// assert_eq!(add.stats().hits, 1);
/// ```
pub struct MemoBuilder<A> {
  keys: KeyStrategy<A>,
  conflicting_keys: bool,
  max_size: Option<usize>,
  time_to_live: Option<Duration>,
  expiration: Expiration,
  janitor_tick_interval: Option<Duration>,
  janitor_enabled: bool,
  spawner: Option<Arc<dyn TaskSpawner>>,
}

// Manual Debug implementation for MemoBuilder.
impl<A> fmt::Debug for MemoBuilder<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoBuilder")
      .field("keys", &self.keys)
      .field("max_size", &self.max_size)
      .field("time_to_live", &self.time_to_live)
      .field("expiration", &self.expiration)
      .field("janitor_enabled", &self.janitor_enabled)
      .field("has_spawner", &self.spawner.is_some())
      .finish_non_exhaustive()
  }
}

// --- Constructors ---

impl<A: Serialize> MemoBuilder<A> {
  /// Creates a builder that keys calls on the structural encoding of their
  /// arguments.
  pub fn new() -> Self {
    Self::with_strategy(KeyStrategy::structural())
  }
}

impl<A: Serialize> Default for MemoBuilder<A> {
  fn default() -> Self {
    Self::new()
  }
}

impl<A> MemoBuilder<A> {
  /// Creates a builder that derives keys with a custom function.
  ///
  /// The function must be deterministic and free of side effects.
  pub fn with_key_fn<F, K>(key_fn: F) -> Self
  where
    F: Fn(&A) -> Result<K, KeyError> + Send + Sync + 'static,
    K: Into<CacheKey>,
  {
    Self::with_strategy(KeyStrategy::custom(key_fn))
  }

  /// Creates a builder in weak mode.
  ///
  /// `key_object` picks the shared object a call is keyed on. Entries are keyed
  /// on that object's identity, and the cache only holds it weakly: once every
  /// `Arc` to it is dropped, its entry becomes unreachable and is removed on the
  /// next read or sweep.
  pub fn with_weak_keys<F, T>(key_object: F) -> Self
  where
    F: Fn(&A) -> Arc<T> + Send + Sync + 'static,
    T: Send + Sync + 'static,
  {
    Self::with_strategy(KeyStrategy::identity(key_object))
  }

  /// Creates a builder from an explicit key strategy.
  pub fn with_strategy(keys: KeyStrategy<A>) -> Self {
    Self {
      keys,
      conflicting_keys: false,
      max_size: None,
      time_to_live: None,
      expiration: Expiration::Absolute,
      janitor_tick_interval: None,
      janitor_enabled: true,
      spawner: None,
    }
  }

  // --- General Configuration Methods ---

  /// Sets the most entries kept at once. The least recently used entry is
  /// evicted when a write would exceed it.
  pub fn max_size(mut self, max_size: usize) -> Self {
    self.max_size = Some(max_size);
    self
  }

  /// Sets a time-to-live for every entry.
  pub fn time_to_live(mut self, duration: Duration) -> Self {
    self.time_to_live = Some(duration);
    self
  }

  /// Makes every hit push the entry's deadline out by a full `time_to_live`.
  ///
  /// By default the deadline is fixed when the entry is written.
  pub fn sliding_expiration(mut self, sliding: bool) -> Self {
    self.expiration = if sliding {
      Expiration::Sliding
    } else {
      Expiration::Absolute
    };
    self
  }

  /// Replaces the key strategy with a custom key function.
  pub fn key_fn<F, K>(mut self, key_fn: F) -> Self
  where
    F: Fn(&A) -> Result<K, KeyError> + Send + Sync + 'static,
    K: Into<CacheKey>,
  {
    self.conflicting_keys |= self.keys.is_identity();
    self.keys = KeyStrategy::custom(key_fn);
    self
  }

  /// Switches to weak mode, keyed on the object `key_object` returns.
  pub fn weak_keys<F, T>(mut self, key_object: F) -> Self
  where
    F: Fn(&A) -> Arc<T> + Send + Sync + 'static,
    T: Send + Sync + 'static,
  {
    self.conflicting_keys |= matches!(self.keys, KeyStrategy::Custom(_));
    self.keys = KeyStrategy::identity(key_object);
    self
  }

  /// Sets the spawner async computations run on.
  ///
  /// Defaults to the Tokio runtime current at build time.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Sets the tick interval for the background cleanup task (janitor).
  pub fn janitor_tick_interval(mut self, duration: Duration) -> Self {
    self.janitor_tick_interval = Some(duration);
    self
  }

  /// Disables the janitor. Expired and reclaimed entries are then only removed
  /// when read, when evicted for capacity, or by `purge_expired`/`purge_reclaimed`.
  pub fn without_janitor(mut self) -> Self {
    self.janitor_enabled = false;
    self
  }

  /// Returns the configuration this builder would produce.
  pub fn config(&self) -> MemoConfig {
    MemoConfig {
      max_size: self.max_size,
      time_to_live: self.time_to_live,
      expiration: self.expiration,
      weak: self.keys.is_identity(),
    }
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.max_size == Some(0) {
      return Err(BuildError::ZeroCapacity);
    }
    if self.time_to_live == Some(Duration::ZERO) {
      return Err(BuildError::ZeroTimeToLive);
    }
    if self.janitor_tick_interval == Some(Duration::ZERO) {
      return Err(BuildError::ZeroTickInterval);
    }
    if self.conflicting_keys {
      return Err(BuildError::ConflictingKeyStrategy);
    }
    Ok(())
  }
}

// --- Build Methods ---

impl<A> MemoBuilder<A>
where
  A: Send + 'static,
{
  /// Wraps a synchronous computation.
  pub fn build<V, E, F>(self, compute: F) -> Result<Memoized<A, V, E>, BuildError>
  where
    F: Fn(A) -> Result<V, E> + Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
  {
    self.validate()?;
    let shared = self.build_shared(Compute::Sync(Arc::new(compute)), None);
    Ok(Memoized { shared })
  }

  /// Wraps an asynchronous computation.
  ///
  /// The computation always runs as a spawned task, so dropping a caller's
  /// future never cancels work other callers are waiting on.
  pub fn build_async<V, E, F, Fut>(mut self, compute: F) -> Result<AsyncMemoized<A, V, E>, BuildError>
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
  {
    self.validate()?;

    let spawner = match self.spawner.take() {
      Some(spawner) => spawner,
      None => Self::default_spawner()?,
    };
    let compute = Compute::Async(Arc::new(move |args: A| compute(args).boxed()));
    let shared = self.build_shared(compute, Some(spawner));
    Ok(AsyncMemoized { shared })
  }

  #[cfg(feature = "tokio")]
  fn default_spawner() -> Result<Arc<dyn TaskSpawner>, BuildError> {
    match crate::runtime::TokioSpawner::try_current() {
      Some(spawner) => Ok(Arc::new(spawner)),
      None => Err(BuildError::SpawnerRequired),
    }
  }

  #[cfg(not(feature = "tokio"))]
  fn default_spawner() -> Result<Arc<dyn TaskSpawner>, BuildError> {
    Err(BuildError::SpawnerRequired)
  }

  /// Central logic to construct the shared core of a memoized function.
  fn build_shared<V, E>(
    self,
    compute: Compute<A, V, E>,
    spawner: Option<Arc<dyn TaskSpawner>>,
  ) -> Arc<MemoShared<A, V, E>>
  where
    V: Send + Sync + 'static,
  {
    let weak = self.keys.is_identity();
    let policy = EvictionPolicy::new(self.max_size, self.time_to_live, self.expiration);
    let core = Arc::new(CacheCore::new(policy, weak));

    let janitor = if self.janitor_enabled && (self.time_to_live.is_some() || weak) {
      let tick_interval = self.janitor_tick_interval.unwrap_or(DEFAULT_JANITOR_TICK);
      Some(Janitor::spawn(Arc::clone(&core), tick_interval))
    } else {
      None
    };

    tracing::debug!(
      keys = ?self.keys,
      max_size = ?self.max_size,
      time_to_live = ?self.time_to_live,
      expiration = ?self.expiration,
      janitor = janitor.is_some(),
      "built memoized function"
    );

    Arc::new(MemoShared {
      core,
      registry: InFlightRegistry::new(),
      keys: self.keys,
      compute,
      spawner,
      janitor,
    })
  }
}

/// Memoizes a synchronous computation with the given configuration.
pub fn memoize<A, V, E, F>(compute: F, config: MemoBuilder<A>) -> Result<Memoized<A, V, E>, BuildError>
where
  A: Send + 'static,
  F: Fn(A) -> Result<V, E> + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  config.build(compute)
}

/// Memoizes an asynchronous computation with the given configuration.
pub fn memoize_async<A, V, E, F, Fut>(
  compute: F,
  config: MemoBuilder<A>,
) -> Result<AsyncMemoized<A, V, E>, BuildError>
where
  A: Send + 'static,
  F: Fn(A) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<V, E>> + Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  config.build_async(compute)
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn zero_bounds_are_rejected() {
    assert_eq!(
      MemoBuilder::<u32>::new().max_size(0).validate(),
      Err(BuildError::ZeroCapacity)
    );
    assert_eq!(
      MemoBuilder::<u32>::new().time_to_live(Duration::ZERO).validate(),
      Err(BuildError::ZeroTimeToLive)
    );
    assert_eq!(
      MemoBuilder::<u32>::new()
        .janitor_tick_interval(Duration::ZERO)
        .validate(),
      Err(BuildError::ZeroTickInterval)
    );
  }

  #[test]
  fn custom_and_weak_keys_conflict() {
    let builder = MemoBuilder::<Arc<String>>::with_weak_keys(|s: &Arc<String>| s.clone())
      .key_fn(|s: &Arc<String>| Ok(s.as_str().to_owned()));
    assert_eq!(builder.validate(), Err(BuildError::ConflictingKeyStrategy));

    let builder = MemoBuilder::<Arc<String>>::with_key_fn(|s: &Arc<String>| Ok(s.len() as u64))
      .weak_keys(|s: &Arc<String>| s.clone());
    assert_eq!(builder.validate(), Err(BuildError::ConflictingKeyStrategy));
  }

  #[test]
  fn structural_keys_may_be_replaced() {
    let builder = MemoBuilder::<String>::new().key_fn(|s: &String| Ok(s.to_lowercase()));
    assert_eq!(builder.validate(), Ok(()));
    assert!(!builder.config().weak);
  }

  #[test]
  fn config_reflects_settings() {
    let config = MemoBuilder::<u32>::new()
      .max_size(8)
      .time_to_live(Duration::from_secs(5))
      .sliding_expiration(true)
      .config();
    assert_eq!(
      config,
      MemoConfig {
        max_size: Some(8),
        time_to_live: Some(Duration::from_secs(5)),
        expiration: Expiration::Sliding,
        weak: false,
      }
    );
  }
}

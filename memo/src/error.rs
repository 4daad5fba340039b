use crate::key::CacheKey;

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when building a memoized function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The function was configured with a `max_size` of zero. Nothing could ever
  /// be cached; leave `max_size` unset for an unbounded cache.
  #[error("max_size cannot be zero")]
  ZeroCapacity,
  /// The function was configured with a zero time-to-live, which would expire
  /// every entry at the moment it is written.
  #[error("time_to_live cannot be zero")]
  ZeroTimeToLive,
  /// The janitor was configured with a zero tick interval.
  #[error("janitor tick interval cannot be zero")]
  ZeroTickInterval,
  /// Both a custom key function and weak identity keys were requested. Weak
  /// mode keys on the identity of the key object, so the two cannot be combined.
  #[error("a custom key function cannot be combined with weak keys")]
  ConflictingKeyStrategy,
  /// An async computation was provided, but no `TaskSpawner` was configured
  /// and no Tokio runtime was available when building.
  #[error("an async computation requires a task spawner or a running tokio runtime")]
  SpawnerRequired,
}

/// An error produced while deriving a cache key from call arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
  /// The arguments could not be encoded into a structural key.
  #[error("failed to encode arguments into a cache key: {0}")]
  Encode(String),
  /// A user-supplied key function rejected the arguments.
  #[error("key function failed: {0}")]
  Custom(String),
}

impl KeyError {
  /// Creates a `KeyError::Custom` from any message, for use inside custom key functions.
  pub fn custom(message: impl Into<String>) -> Self {
    KeyError::Custom(message.into())
  }
}

impl From<bincode::Error> for KeyError {
  fn from(err: bincode::Error) -> Self {
    KeyError::Encode(err.to_string())
  }
}

/// The error returned by a memoized call.
///
/// `Compute` carries the exact error the wrapped computation produced. When
/// several callers were waiting on the same in-flight computation, they all
/// receive the same shared error.
#[derive(Debug, Error)]
pub enum MemoError<E> {
  /// The wrapped computation returned an error. It was not cached.
  #[error("computation failed: {0}")]
  Compute(Arc<E>),
  /// The cache key could not be derived from the arguments.
  #[error(transparent)]
  Key(#[from] KeyError),
  /// The computation panicked, or its task was dropped, before producing a result.
  #[error("computation for key {0:?} was abandoned before completing")]
  Abandoned(CacheKey),
}

impl<E> MemoError<E> {
  /// Returns the computation's own error, if this is a `Compute` failure.
  pub fn compute_error(&self) -> Option<&E> {
    match self {
      MemoError::Compute(err) => Some(err),
      _ => None,
    }
  }
}

impl<E> Clone for MemoError<E> {
  fn clone(&self) -> Self {
    match self {
      MemoError::Compute(err) => MemoError::Compute(err.clone()),
      MemoError::Key(err) => MemoError::Key(err.clone()),
      MemoError::Abandoned(key) => MemoError::Abandoned(key.clone()),
    }
  }
}

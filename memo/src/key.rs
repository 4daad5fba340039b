//! Cache key derivation.
//!
//! A `KeyStrategy` turns the arguments of a call into a `CacheKey`. Three
//! strategies exist:
//!
//! - **Structural** (the default): the arguments are encoded with `bincode`, so
//!   argument order and deep value equality decide key equality. Arguments must
//!   encode deterministically; prefer `BTreeMap` over `HashMap` inside them.
//! - **Custom**: a user function maps the arguments to any `Into<CacheKey>` value.
//! - **Identity**: the key is the address of a shared key object (`Arc<T>`), used
//!   by weak mode. The engine only keeps a `Weak` handle to that object.

use crate::error::KeyError;

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::Serialize;

/// A type-erased weak handle to the key object of a weak-mode entry.
pub(crate) type KeyObject = Weak<dyn Any + Send + Sync>;

type KeyFn<A> = Arc<dyn Fn(&A) -> Result<CacheKey, KeyError> + Send + Sync>;
type ObjectFn<A> = Arc<dyn Fn(&A) -> Arc<dyn Any + Send + Sync> + Send + Sync>;

/// An opaque, hashable key derived from the arguments of a call.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Repr);

#[derive(Clone, PartialEq, Eq, Hash)]
enum Repr {
  Encoded(Box<[u8]>),
  Identity(usize),
}

impl CacheKey {
  /// Encodes any serializable value into a structural key.
  pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, KeyError> {
    let bytes = bincode::serialize(value)?;
    Ok(Self(Repr::Encoded(bytes.into_boxed_slice())))
  }

  /// Wraps raw bytes as a key.
  pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
    Self(Repr::Encoded(bytes.into()))
  }

  /// Returns `true` if this key is the identity of a weak-mode key object.
  pub fn is_identity(&self) -> bool {
    matches!(self.0, Repr::Identity(_))
  }

  fn identity_of(object: &Arc<dyn Any + Send + Sync>) -> Self {
    Self(Repr::Identity(Arc::as_ptr(object) as *const () as usize))
  }
}

impl fmt::Debug for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.0 {
      Repr::Encoded(bytes) => {
        write!(f, "CacheKey(")?;
        for byte in bytes.iter().take(16) {
          write!(f, "{:02x}", byte)?;
        }
        if bytes.len() > 16 {
          write!(f, "..")?;
        }
        write!(f, ")")
      }
      Repr::Identity(addr) => write!(f, "CacheKey(@{:#x})", addr),
    }
  }
}

impl From<&str> for CacheKey {
  fn from(value: &str) -> Self {
    Self::from_bytes(value.as_bytes())
  }
}

impl From<String> for CacheKey {
  fn from(value: String) -> Self {
    Self::from_bytes(value.into_bytes())
  }
}

impl From<u64> for CacheKey {
  fn from(value: u64) -> Self {
    Self::from_bytes(value.to_le_bytes())
  }
}

impl From<i64> for CacheKey {
  fn from(value: i64) -> Self {
    Self::from_bytes(value.to_le_bytes())
  }
}

impl From<u32> for CacheKey {
  fn from(value: u32) -> Self {
    Self::from(value as u64)
  }
}

impl From<i32> for CacheKey {
  fn from(value: i32) -> Self {
    Self::from(value as i64)
  }
}

impl From<Vec<u8>> for CacheKey {
  fn from(value: Vec<u8>) -> Self {
    Self::from_bytes(value)
  }
}

/// The result of deriving a key: the key itself and, in weak mode, a weak
/// handle to the key object.
pub(crate) struct DerivedKey {
  pub(crate) key: CacheKey,
  pub(crate) object: Option<KeyObject>,
}

/// How a memoized function derives cache keys from its arguments.
pub enum KeyStrategy<A> {
  /// Structural encoding of the whole argument value.
  Structural(fn(&A) -> Result<CacheKey, KeyError>),
  /// A user-supplied key function.
  Custom(KeyFn<A>),
  /// The identity of a shared key object. Enables weak mode.
  Identity(ObjectFn<A>),
}

impl<A> Clone for KeyStrategy<A> {
  fn clone(&self) -> Self {
    match self {
      KeyStrategy::Structural(f) => KeyStrategy::Structural(*f),
      KeyStrategy::Custom(f) => KeyStrategy::Custom(f.clone()),
      KeyStrategy::Identity(f) => KeyStrategy::Identity(f.clone()),
    }
  }
}

impl<A> fmt::Debug for KeyStrategy<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyStrategy::Structural(_) => write!(f, "Structural"),
      KeyStrategy::Custom(_) => write!(f, "Custom"),
      KeyStrategy::Identity(_) => write!(f, "Identity"),
    }
  }
}

impl<A: Serialize> KeyStrategy<A> {
  /// The default strategy: encode the arguments structurally.
  pub fn structural() -> Self {
    KeyStrategy::Structural(CacheKey::encode::<A>)
  }
}

impl<A> KeyStrategy<A> {
  /// Derives keys with a user function.
  pub fn custom<F, K>(key_fn: F) -> Self
  where
    F: Fn(&A) -> Result<K, KeyError> + Send + Sync + 'static,
    K: Into<CacheKey>,
  {
    KeyStrategy::Custom(Arc::new(move |args: &A| key_fn(args).map(Into::into)))
  }

  /// Keys on the identity of the object returned by `key_object`.
  pub fn identity<F, T>(key_object: F) -> Self
  where
    F: Fn(&A) -> Arc<T> + Send + Sync + 'static,
    T: Send + Sync + 'static,
  {
    KeyStrategy::Identity(Arc::new(move |args: &A| {
      let object: Arc<dyn Any + Send + Sync> = key_object(args);
      object
    }))
  }

  /// Returns `true` for the identity (weak mode) strategy.
  pub fn is_identity(&self) -> bool {
    matches!(self, KeyStrategy::Identity(_))
  }

  /// Derives the key for a call. Deterministic and side-effect free.
  pub(crate) fn derive(&self, args: &A) -> Result<DerivedKey, KeyError> {
    match self {
      KeyStrategy::Structural(encode) => Ok(DerivedKey {
        key: encode(args)?,
        object: None,
      }),
      KeyStrategy::Custom(key_fn) => Ok(DerivedKey {
        key: key_fn(args)?,
        object: None,
      }),
      KeyStrategy::Identity(key_object) => {
        let object = key_object(args);
        Ok(DerivedKey {
          key: CacheKey::identity_of(&object),
          object: Some(Arc::downgrade(&object)),
        })
      }
    }
  }
}

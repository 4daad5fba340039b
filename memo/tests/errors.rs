use fibre_memo::{BuildError, KeyError, MemoBuilder, MemoError};
use serde::{Serialize, Serializer};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

fn identity(n: u32) -> Result<u32, Infallible> {
  Ok(n)
}

#[test]
fn test_invalid_configurations_are_rejected() {
  assert_eq!(
    MemoBuilder::new().max_size(0).build(identity).unwrap_err(),
    BuildError::ZeroCapacity
  );
  assert_eq!(
    MemoBuilder::new()
      .time_to_live(Duration::ZERO)
      .build(identity)
      .unwrap_err(),
    BuildError::ZeroTimeToLive
  );
  assert_eq!(
    MemoBuilder::new()
      .janitor_tick_interval(Duration::ZERO)
      .build(identity)
      .unwrap_err(),
    BuildError::ZeroTickInterval
  );
  assert_eq!(
    MemoBuilder::with_weak_keys(|s: &Arc<String>| s.clone())
      .key_fn(|s: &Arc<String>| Ok(s.to_string()))
      .build(|s: Arc<String>| Ok::<_, Infallible>(s.len()))
      .unwrap_err(),
    BuildError::ConflictingKeyStrategy
  );
}

#[test]
fn test_async_computation_needs_a_spawner() {
  // No tokio runtime is running on this thread.
  let result = MemoBuilder::new().build_async(|n: u32| async move { Ok::<_, Infallible>(n) });
  assert_eq!(result.unwrap_err(), BuildError::SpawnerRequired);
}

struct Unencodable;

impl Serialize for Unencodable {
  fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
    Err(serde::ser::Error::custom("handles cannot be encoded"))
  }
}

#[test]
fn test_unencodable_arguments_fail_before_computing() {
  let memo = MemoBuilder::new()
    .build(|_: Unencodable| -> Result<u32, Infallible> { panic!("must not run") })
    .unwrap();

  match memo.call(Unencodable) {
    Err(MemoError::Key(KeyError::Encode(msg))) => assert!(msg.contains("handles cannot be encoded")),
    other => panic!("expected an encoding error, got {:?}", other.map(|_| ())),
  }
  assert!(memo.is_empty());
}

#[test]
fn test_error_messages() {
  let err: MemoError<String> = MemoError::Compute(Arc::new("disk full".to_string()));
  assert_eq!(err.to_string(), "computation failed: disk full");
  assert_eq!(err.clone().compute_error().map(String::as_str), Some("disk full"));

  let err: MemoError<String> = KeyError::custom("bad key").into();
  assert_eq!(err.to_string(), "key function failed: bad key");
  assert!(err.compute_error().is_none());

  assert_eq!(BuildError::ZeroCapacity.to_string(), "max_size cannot be zero");
}

mod common;

use common::CallCounter;
use fibre_memo::{MemoBuilder, MemoError};
use std::convert::Infallible;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_concurrent_calls_share_one_computation() {
  let counter = CallCounter::new();
  let num_threads = 20;

  let memo = Arc::new(
    MemoBuilder::new()
      .build({
        let counter = counter.clone();
        move |n: u64| {
          // Simulate a slow database call or computation
          thread::sleep(Duration::from_millis(100));
          counter.bump();
          Ok::<_, Infallible>(n * 10)
        }
      })
      .unwrap(),
  );

  let barrier = Arc::new(Barrier::new(num_threads));
  let handles: Vec<_> = (0..num_threads)
    .map(|_| {
      let memo = memo.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        memo.call(7).unwrap()
      })
    })
    .collect();

  let values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

  assert_eq!(counter.count(), 1, "computation should run exactly once");
  for value in &values {
    assert_eq!(**value, 70);
    assert!(Arc::ptr_eq(value, &values[0]), "every caller shares the same value");
  }

  let stats = memo.stats();
  assert_eq!(stats.hits + stats.misses, num_threads as u64);
  assert_eq!(stats.misses, stats.deduped_waits + 1);
  assert_eq!(stats.inserts, 1);
  assert_eq!(memo.in_flight(), 0);
}

#[test]
fn test_errors_reach_every_waiter() {
  let counter = CallCounter::new();
  let num_threads = 8;

  let memo = Arc::new(
    MemoBuilder::new()
      .build({
        let counter = counter.clone();
        move |_: u64| -> Result<u64, String> {
          thread::sleep(Duration::from_millis(150));
          Err(format!("failure #{}", counter.bump()))
        }
      })
      .unwrap(),
  );

  let barrier = Arc::new(Barrier::new(num_threads));
  let handles: Vec<_> = (0..num_threads)
    .map(|_| {
      let memo = memo.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        memo.call(1)
      })
    })
    .collect();

  for handle in handles {
    match handle.join().unwrap() {
      Err(MemoError::Compute(err)) => assert_eq!(*err, "failure #1"),
      other => panic!("expected the shared failure, got {:?}", other),
    }
  }
  assert_eq!(counter.count(), 1);
  assert!(memo.is_empty());
  assert_eq!(memo.in_flight(), 0);
  assert_eq!(memo.stats().failures, 1);
}

#[test]
fn test_distinct_keys_compute_in_parallel() {
  let memo = Arc::new(
    MemoBuilder::new()
      .build(|n: u64| {
        thread::sleep(Duration::from_millis(100));
        Ok::<_, Infallible>(n)
      })
      .unwrap(),
  );

  let start = Instant::now();
  let handles: Vec<_> = (0..4)
    .map(|n| {
      let memo = memo.clone();
      thread::spawn(move || *memo.call(n).unwrap())
    })
    .collect();
  let mut values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
  values.sort();

  assert_eq!(values, vec![0, 1, 2, 3]);
  assert!(
    start.elapsed() < Duration::from_millis(350),
    "computations for different keys must not serialize"
  );
  assert_eq!(memo.stats().deduped_waits, 0);
}

#[test]
fn test_panicking_computation_is_abandoned() {
  let counter = CallCounter::new();
  let memo = Arc::new(
    MemoBuilder::new()
      .build({
        let counter = counter.clone();
        move |n: u64| {
          if counter.bump() == 1 {
            thread::sleep(Duration::from_millis(150));
            panic!("computation exploded");
          }
          Ok::<_, Infallible>(n)
        }
      })
      .unwrap(),
  );

  let leader = {
    let memo = memo.clone();
    thread::spawn(move || memo.call(5))
  };
  thread::sleep(Duration::from_millis(30));
  let waiter = {
    let memo = memo.clone();
    thread::spawn(move || memo.call(5))
  };

  assert!(leader.join().is_err(), "the panic propagates to the caller that ran it");
  match waiter.join().unwrap() {
    Err(MemoError::Abandoned(_)) => {}
    other => panic!("expected an abandoned computation, got {:?}", other),
  }

  assert_eq!(memo.in_flight(), 0, "no stale pending marker");
  assert_eq!(*memo.call(5).unwrap(), 5);
  assert_eq!(counter.count(), 2);

  let stats = memo.stats();
  assert_eq!(stats.failures, 1);
  assert_eq!(stats.deduped_waits, 1);
}

#[test]
fn test_invalidate_while_computing() {
  let counter = CallCounter::new();
  let memo = Arc::new(
    MemoBuilder::new()
      .build({
        let counter = counter.clone();
        move |n: u64| {
          let run = counter.bump() as u64;
          thread::sleep(Duration::from_millis(150));
          Ok::<_, Infallible>(n * 100 + run)
        }
      })
      .unwrap(),
  );

  let caller = {
    let memo = memo.clone();
    thread::spawn(move || *memo.call(1).unwrap())
  };
  thread::sleep(Duration::from_millis(30));
  assert_eq!(memo.in_flight(), 1);
  assert!(!memo.invalidate(&1).unwrap(), "nothing stored yet");
  assert_eq!(memo.in_flight(), 0);

  // The running computation still answers its caller...
  assert_eq!(caller.join().unwrap(), 101);
  // ...but its result was never written.
  assert!(!memo.contains(&1).unwrap());
  assert_eq!(*memo.call(1).unwrap(), 102);
  assert_eq!(counter.count(), 2);
}

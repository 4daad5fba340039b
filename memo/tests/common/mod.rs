#![allow(dead_code)]

use fibre_memo::{MemoBuilder, Memoized};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Counts how many times a computation actually ran.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Records one invocation and returns its 1-based ordinal.
  pub fn bump(&self) -> usize {
    self.0.fetch_add(1, Ordering::SeqCst) + 1
  }

  pub fn count(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }
}

/// A memoized `add` that counts its invocations.
pub fn counting_adder(max_size: usize) -> (Memoized<(i32, i32), i32, Infallible>, CallCounter) {
  let counter = CallCounter::new();
  let memo = MemoBuilder::new()
    .max_size(max_size)
    .build({
      let counter = counter.clone();
      move |(a, b): (i32, i32)| {
        counter.bump();
        Ok(a + b)
      }
    })
    .unwrap();
  (memo, counter)
}

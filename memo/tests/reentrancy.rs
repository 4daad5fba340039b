mod common;

use common::CallCounter;
use fibre_memo::{MemoBuilder, Memoized};
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[test]
fn test_recursive_computation_uses_its_own_cache() {
  let counter = CallCounter::new();
  let cell: Arc<OnceCell<Memoized<u64, u64, String>>> = Arc::new(OnceCell::new());

  let fib = MemoBuilder::new()
    .build({
      let counter = counter.clone();
      let cell = cell.clone();
      move |n: u64| -> Result<u64, String> {
        counter.bump();
        if n < 2 {
          return Ok(n);
        }
        let fib = cell.get().ok_or("fib is not initialized")?;
        let a = fib.call(n - 1).map_err(|err| err.to_string())?;
        let b = fib.call(n - 2).map_err(|err| err.to_string())?;
        Ok(*a + *b)
      }
    })
    .unwrap();
  assert!(cell.set(fib).is_ok());

  let fib = cell.get().unwrap();
  assert_eq!(*fib.call(50).unwrap(), 12_586_269_025);
  assert_eq!(counter.count(), 51, "each n is computed once");
  assert_eq!(fib.len(), 51);
}

#[test]
fn test_reentering_the_same_key_does_not_deadlock() {
  let counter = CallCounter::new();
  let cell: Arc<OnceCell<Memoized<u64, u64, String>>> = Arc::new(OnceCell::new());

  let memo = MemoBuilder::new()
    .build({
      let counter = counter.clone();
      let cell = cell.clone();
      move |n: u64| -> Result<u64, String> {
        if counter.bump() == 1 {
          let memo = cell.get().ok_or("not initialized")?;
          let inner = memo.call(n).map_err(|err| err.to_string())?;
          Ok(*inner + 100)
        } else {
          Ok(n)
        }
      }
    })
    .unwrap();
  assert!(cell.set(memo).is_ok());

  let memo = cell.get().unwrap();
  assert_eq!(*memo.call(5).unwrap(), 105);
  assert_eq!(counter.count(), 2, "the inner call bypasses the cache");
  assert_eq!(*memo.call(5).unwrap(), 105, "the outer result is cached");
  assert_eq!(memo.stats().inserts, 1);
  assert_eq!(memo.stats().deduped_waits, 0);
}

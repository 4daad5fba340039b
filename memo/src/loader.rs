use crate::error::MemoError;
use crate::key::CacheKey;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread, ThreadId};

use futures_util::future::BoxFuture;

/// Represents a waiter in the queue for a `LoadFuture`.
pub(crate) enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

/// Why a computation produced no value.
pub(crate) enum Failure<E> {
  /// The computation returned an error.
  Compute(Arc<E>),
  /// The computation panicked or its task was dropped.
  Abandoned,
}

impl<E> Clone for Failure<E> {
  fn clone(&self) -> Self {
    match self {
      Failure::Compute(err) => Failure::Compute(err.clone()),
      Failure::Abandoned => Failure::Abandoned,
    }
  }
}

/// The settled result of a computation, shared with every waiter.
pub(crate) type Outcome<V, E> = Result<Arc<V>, Failure<E>>;

/// Converts a shared outcome into the caller-facing result.
pub(crate) fn into_result<V, E>(outcome: Outcome<V, E>, key: &CacheKey) -> Result<Arc<V>, MemoError<E>> {
  outcome.map_err(|failure| match failure {
    Failure::Compute(err) => MemoError::Compute(err),
    Failure::Abandoned => MemoError::Abandoned(key.clone()),
  })
}

/// The internal state of a value being computed.
pub(crate) enum State<V, E> {
  Computing,
  Complete(Outcome<V, E>),
}

/// The internal, mutex-protected core of the LoadFuture.
pub(crate) struct Inner<V, E> {
  pub(crate) state: State<V, E>,
  pub(crate) waiters: VecDeque<Waiter>,
}

/// A pending computation for one key.
///
/// It can be waited on by multiple sync threads and awaited by multiple async
/// tasks simultaneously; all of them observe the same outcome.
pub(crate) struct LoadFuture<V, E> {
  pub(crate) inner: Mutex<Inner<V, E>>,
  /// The thread running the computation inline, if any. Used to detect a
  /// computation that re-enters its own key.
  leader: Option<ThreadId>,
  /// Callers that joined this computation instead of starting their own.
  joined: AtomicUsize,
}

impl<V, E> LoadFuture<V, E> {
  /// Creates a new `LoadFuture` in the "Computing" state.
  pub fn new(leader: Option<ThreadId>) -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Computing,
        waiters: VecDeque::new(),
      }),
      leader,
      joined: AtomicUsize::new(0),
    }
  }

  /// Registers one more caller waiting on this computation.
  pub fn join(&self) {
    self.joined.fetch_add(1, Ordering::Relaxed);
  }

  pub fn joined(&self) -> usize {
    self.joined.load(Ordering::Relaxed)
  }

  /// Returns `true` if the current thread is the one computing this value inline.
  pub fn is_led_by_current_thread(&self) -> bool {
    self.leader == Some(thread::current().id())
  }

  /// Completes the future with an outcome, waking all waiters.
  /// Only the first completion takes effect.
  pub fn complete(&self, outcome: Outcome<V, E>) {
    let mut inner = self.inner.lock();
    if let State::Complete(_) = inner.state {
      return;
    }
    inner.state = State::Complete(outcome);
    for waiter in inner.waiters.drain(..) {
      waiter.wake();
    }
  }

  /// Blocks the current thread until the outcome is available.
  pub fn wait(&self) -> Outcome<V, E> {
    let current = thread::current();
    let mut inner = self.inner.lock();
    loop {
      match &inner.state {
        State::Complete(outcome) => return outcome.clone(),
        State::Computing => {
          // A spurious wakeup finds this thread already queued.
          if !inner.waiters.iter().any(|w| matches!(w, Waiter::Sync(t) if t.id() == current.id())) {
            inner.waiters.push_back(Waiter::Sync(current.clone()));
          }
          drop(inner); // Unlock before parking.
          thread::park();
          inner = self.inner.lock();
        }
      }
    }
  }
}

impl<V, E> Future for &LoadFuture<V, E> {
  type Output = Outcome<V, E>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.inner.lock();
    match &inner.state {
      State::Complete(outcome) => Poll::Ready(outcome.clone()),
      State::Computing => {
        if !inner.waiters.iter().any(|w| matches!(w, Waiter::Async(waker) if waker.will_wake(cx.waker()))) {
          inner.waiters.push_back(Waiter::Async(cx.waker().clone()));
        }
        Poll::Pending
      }
    }
  }
}

/// The wrapped computation, either synchronous or asynchronous.
pub(crate) enum Compute<A, V, E> {
  Sync(Arc<dyn Fn(A) -> Result<V, E> + Send + Sync>),
  Async(Arc<dyn Fn(A) -> BoxFuture<'static, Result<V, E>> + Send + Sync>),
}

impl<A, V, E> Clone for Compute<A, V, E> {
  fn clone(&self) -> Self {
    match self {
      Compute::Sync(f) => Compute::Sync(f.clone()),
      Compute::Async(f) => Compute::Async(f.clone()),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::time::Duration;

  #[test]
  fn waiting_threads_see_the_same_outcome() {
    let future = Arc::new(LoadFuture::<i32, String>::new(None));

    let handles: Vec<_> = (0..4)
      .map(|_| {
        let future = future.clone();
        future.join();
        thread::spawn(move || future.wait().ok().map(|v| *v))
      })
      .collect();

    thread::sleep(Duration::from_millis(20));
    future.complete(Ok(Arc::new(7)));

    for handle in handles {
      assert_eq!(handle.join().unwrap(), Some(7));
    }
    assert_eq!(future.joined(), 4);
  }

  #[test]
  fn spurious_wakeups_do_not_requeue_a_thread() {
    let future = Arc::new(LoadFuture::<i32, ()>::new(None));
    let waiter = {
      let future = future.clone();
      thread::spawn(move || future.wait().ok().map(|v| *v))
    };

    thread::sleep(Duration::from_millis(20));
    for _ in 0..5 {
      waiter.thread().unpark();
      thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(future.inner.lock().waiters.len(), 1);

    future.complete(Ok(Arc::new(3)));
    assert_eq!(waiter.join().unwrap(), Some(3));
  }

  #[test]
  fn first_completion_wins() {
    let future = LoadFuture::<i32, String>::new(None);
    future.complete(Err(Failure::Compute(Arc::new("boom".to_string()))));
    future.complete(Ok(Arc::new(1)));

    match future.wait() {
      Err(Failure::Compute(err)) => assert_eq!(*err, "boom"),
      _ => panic!("expected the first outcome"),
    }
  }

  #[test]
  fn leader_is_recorded() {
    let mine = LoadFuture::<i32, ()>::new(Some(thread::current().id()));
    assert!(mine.is_led_by_current_thread());

    let spawned = LoadFuture::<i32, ()>::new(None);
    assert!(!spawned.is_led_by_current_thread());
  }

  #[test]
  fn async_waiters_are_woken() {
    let future = Arc::new(LoadFuture::<i32, ()>::new(None));
    let completer = {
      let future = future.clone();
      thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        future.complete(Ok(Arc::new(42)));
      })
    };

    let outcome = futures_executor::block_on(&*future);
    assert_eq!(outcome.ok().map(|v| *v), Some(42));
    completer.join().unwrap();
  }
}

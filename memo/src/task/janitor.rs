use crate::shared::CacheCore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The background task that sweeps expired and reclaimed entries.
///
/// Reads already validate entries lazily, so the janitor only bounds how long
/// dead entries can occupy memory when nobody reads them.
pub(crate) struct Janitor {
  handle: JoinHandle<()>,
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  /// Spawns a new janitor thread.
  pub(crate) fn spawn<V>(core: Arc<CacheCore<V>>, tick_interval: Duration) -> Self
  where
    V: Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_clone = stop_flag.clone();

    let handle = thread::spawn(move || {
      tracing::debug!(?tick_interval, "janitor started");
      while !stop_clone.load(Ordering::Relaxed) {
        let tick_start = Instant::now();

        Self::cleanup(&core);

        // Park for the rest of the tick; `stop` unparks us early.
        if let Some(remaining) = tick_interval.checked_sub(tick_start.elapsed()) {
          thread::park_timeout(remaining);
        }
      }
      tracing::debug!("janitor stopped");
    });

    Self { handle, stop_flag }
  }

  fn cleanup<V>(core: &CacheCore<V>) {
    let expired = if core.policy.time_to_live.is_some() {
      core.purge_expired()
    } else {
      0
    };
    let reclaimed = core.purge_reclaimed();

    if expired + reclaimed > 0 {
      tracing::trace!(expired, reclaimed, "janitor tick");
    }
  }

  /// Signals the janitor thread to stop.
  pub(crate) fn stop(self) {
    self.stop_flag.store(true, Ordering::Relaxed);
    self.handle.thread().unpark();
  }
}

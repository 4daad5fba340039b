use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal counter set for a memoized function.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Hit/Miss Ratios ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) deduped_waits: CachePadded<AtomicU64>,

  // --- Throughput ---
  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,
  pub(crate) failures: CachePadded<AtomicU64>,

  // --- Eviction Stats ---
  pub(crate) evicted_by_capacity: CachePadded<AtomicU64>,
  pub(crate) evicted_by_ttl: CachePadded<AtomicU64>,
  pub(crate) evicted_by_reclaim: CachePadded<AtomicU64>,

  // --- Timestamps for Uptime ---
  created_at: Instant,
}

// Manual implementation of Default to handle the non-default `Instant`.
impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      deduped_waits: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      failures: CachePadded::new(AtomicU64::new(0)),
      evicted_by_capacity: CachePadded::new(AtomicU64::new(0)),
      evicted_by_ttl: CachePadded::new(AtomicU64::new(0)),
      evicted_by_reclaim: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn record(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current counters.
  pub(crate) fn snapshot(&self) -> Stats {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    let evicted_by_capacity = self.evicted_by_capacity.load(Ordering::Relaxed);
    let evicted_by_ttl = self.evicted_by_ttl.load(Ordering::Relaxed);
    let evicted_by_reclaim = self.evicted_by_reclaim.load(Ordering::Relaxed);

    Stats {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      evictions: evicted_by_capacity + evicted_by_ttl + evicted_by_reclaim,
      deduped_waits: self.deduped_waits.load(Ordering::Relaxed),
      inserts: self.inserts.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      failures: self.failures.load(Ordering::Relaxed),
      evicted_by_capacity,
      evicted_by_ttl,
      evicted_by_reclaim,
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, read-only snapshot of a memoized function's counters.
///
/// All counters only ever increase.
#[derive(Clone, PartialEq)]
pub struct Stats {
  /// Calls answered from the cache.
  pub hits: u64,
  /// Calls that found no usable entry. A miss is counted even when the
  /// computation it triggers (or joins) later fails.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// Entries removed by the engine: capacity, expiration and reclamation.
  pub evictions: u64,
  /// Calls that joined a computation already in flight instead of starting one.
  pub deduped_waits: u64,
  /// Successful computations written into the cache.
  pub inserts: u64,
  /// Entries removed by `invalidate`.
  pub invalidations: u64,
  /// Computations that returned an error or were abandoned.
  pub failures: u64,
  /// Entries evicted because `max_size` was exceeded.
  pub evicted_by_capacity: u64,
  /// Entries removed because their time-to-live elapsed.
  pub evicted_by_ttl: u64,
  /// Weak-mode entries removed because their key object was dropped.
  pub evicted_by_reclaim: u64,
  /// The number of seconds since the memoized function was built.
  pub uptime_secs: u64,
}

impl fmt::Debug for Stats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stats")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("evictions", &self.evictions)
      .field("deduped_waits", &self.deduped_waits)
      .field("inserts", &self.inserts)
      .field("invalidations", &self.invalidations)
      .field("failures", &self.failures)
      .field("evicted_by_capacity", &self.evicted_by_capacity)
      .field("evicted_by_ttl", &self.evicted_by_ttl)
      .field("evicted_by_reclaim", &self.evicted_by_reclaim)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}

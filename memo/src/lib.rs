//! Concurrent memoization for sync and async computations.
//!
//! `fibre_memo` wraps a computation so repeated calls with equivalent arguments
//! return a cached result instead of recomputing it.
//!
//! # Features
//! - **Single-flight**: concurrent calls for the same key share one in-flight
//!   computation. Errors reach every waiter and are never cached.
//! - **Sync & Async**: `Memoized` blocks, `AsyncMemoized` is awaited; both wrap
//!   the same core and convert into each other.
//! - **Flexible keys**: structural keys from any `serde::Serialize` arguments,
//!   custom key functions, or weak mode keyed on the identity of a shared object
//!   the cache never keeps alive.
//! - **Bounded**: a least-recently-used size bound and a time-to-live, with
//!   absolute or sliding expiration.
//! - **Observability**: hit, miss, eviction and dedup counters through `stats()`,
//!   and `tracing` events.
//!
//! ```
//! use fibre_memo::{MemoBuilder, MemoError};
//! use std::time::Duration;
//!
//! let lookup = MemoBuilder::new()
//!   .max_size(1_000)
//!   .time_to_live(Duration::from_secs(60))
//!   .build(|user_id: u64| {
//!     if user_id == 0 {
//!       Err("no such user")
//!     } else {
//!       Ok(format!("user-{user_id}"))
//!     }
//!   })
//!   .unwrap();
//!
//! assert_eq!(lookup.call(7).unwrap().as_str(), "user-7");
//! assert!(matches!(lookup.call(0), Err(MemoError::Compute(_))));
//! assert_eq!(lookup.len(), 1);
//! ```

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod handles;
pub mod key;
pub mod metrics;
pub mod policy;
pub mod runtime;

// Internal, crate-only modules
mod entry;
mod loader;
mod registry;
mod shared;
mod store;
mod task;
mod time;
mod weak;

// Re-export the primary user-facing types for convenience
pub use builder::{memoize, memoize_async, MemoBuilder, MemoConfig};
pub use error::{BuildError, KeyError, MemoError};
pub use handles::{AsyncMemoized, Memoized};
pub use key::{CacheKey, KeyStrategy};
pub use metrics::Stats;
pub use policy::{EvictionReason, Expiration};
pub use runtime::TaskSpawner;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;

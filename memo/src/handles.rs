//! The user-facing handles of a memoized function.
//!
//! `Memoized` blocks the calling thread; `AsyncMemoized` is awaited. Both wrap
//! the same shared core, and each can be converted into the other.

mod futures;
mod sync;

pub use futures::AsyncMemoized;
pub use sync::Memoized;

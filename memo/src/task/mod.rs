//! Background maintenance for memoized functions.

pub(crate) mod janitor;

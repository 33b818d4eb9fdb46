//! Control structures for deferred evaluation.
//!
//! This module provides [`Thunk`], a thread-safe memoizing suspension: a
//! computation that runs at most once, the first time it is forced, and
//! caches its result for every later access. Thunks are the value carrier of
//! [`DelayMap`](crate::persistent::DelayMap).
//!
//! # Examples
//!
//! ```rust
//! use evergreen::control::Thunk;
//!
//! let thunk = Thunk::defer(|| {
//!     // Expensive work happens here, once
//!     6 * 7
//! });
//!
//! assert!(!thunk.is_evaluated());
//! assert_eq!(*thunk.force(), 42);
//! assert!(thunk.is_evaluated());
//!
//! // Clones share the memoized result
//! let shared = thunk.clone();
//! assert_eq!(*shared.force(), 42);
//! ```

mod thunk;

pub use thunk::Thunk;
pub use thunk::ThunkPoisonedError;

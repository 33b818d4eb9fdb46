//! Persistent (immutable) data structures.
//!
//! This module provides immutable ordered collections that use structural
//! sharing to minimize copying:
//!
//! - [`RedBlackTree`]: the immutable balanced search tree the maps are built
//!   on, with fork-join parallel walks for pure transformations
//! - [`TreeMap`]: a persistent ordered map
//! - [`DelayMap`]: a persistent ordered map with lazily evaluated values
//!
//! # Structural Sharing
//!
//! Every mutating operation returns a new value that shares all unchanged
//! subtrees with its input, so an update allocates only the O(log N) path
//! from the root to the touched node.
//!
//! # Examples
//!
//! ## `TreeMap`
//!
//! ```rust
//! use evergreen::persistent::TreeMap;
//!
//! let map = TreeMap::new()
//!     .insert(3, "three")
//!     .insert(1, "one")
//!     .insert(2, "two");
//!
//! // Entries are always in sorted order
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&1, &2, &3]);
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert(1, "ONE");
//! assert_eq!(map.get(&1), Some(&"one"));     // Original unchanged
//! assert_eq!(updated.get(&1), Some(&"ONE")); // New version
//! ```
//!
//! ## `DelayMap`
//!
//! ```rust
//! use evergreen::persistent::DelayMap;
//!
//! let map = DelayMap::new()
//!     .insert_lazy(1, || "expensive".to_string())
//!     .insert(2, "cheap".to_string());
//!
//! // Nothing has been computed yet for key 1; reading it forces exactly
//! // that entry.
//! assert_eq!(map.get(&1), Some(&"expensive".to_string()));
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer used for all shared tree nodes.
///
/// This is always `std::sync::Arc`: the parallel tree walks hand references
/// to shared subtrees across worker threads, so the nodes must be `Send +
/// Sync` shareable.
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

mod delaymap;
mod tree;
mod treemap;

pub use delaymap::DelayMap;
pub use tree::RedBlackTree;
pub use treemap::TreeMap;
pub use treemap::TreeMapIntoIterator;
pub use treemap::TreeMapIterator;

// =============================================================================
// Tests
// =============================================================================

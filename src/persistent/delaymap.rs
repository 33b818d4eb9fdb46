//! Persistent (immutable) ordered map with lazily evaluated values.
//!
//! This module provides [`DelayMap`], a variant of
//! [`TreeMap`](super::TreeMap) whose values are memoizing suspensions
//! ([`Thunk`]). An entry's value is computed the first time something reads
//! it, and never again; entries nobody reads are never computed at all.
//!
//! # Lazy and eager combinators
//!
//! Every combinator that takes a user function comes in two forms:
//!
//! - the `*_lazy` form takes a **pure** function (`Fn + Send + Sync`) and
//!   composes suspensions: nothing runs until the resulting entry is
//!   forced, and forcing it forces exactly the inputs it needs;
//! - the `*_eager` form takes a possibly effectful function, forces the
//!   inputs it needs immediately, runs the function now (so its effects
//!   happen in key order, exactly once), and stores the result already
//!   evaluated.
//!
//! Reads (`get`, `to_list`, `to_map`, the folds) force only the values they
//! return. Provided every stored suspension is eventually forced, a
//! `DelayMap` behaves exactly like the `TreeMap` of the same entries.
//!
//! # Examples
//!
//! ```rust
//! use evergreen::persistent::DelayMap;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let runs = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&runs);
//!
//! let map = DelayMap::new()
//!     .insert_lazy(1, move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!         "computed".to_string()
//!     })
//!     .insert(2, "eager".to_string());
//!
//! // Nothing has run yet
//! assert_eq!(runs.load(Ordering::SeqCst), 0);
//!
//! // Reading key 1 forces exactly that entry, once
//! assert_eq!(map.get(&1), Some(&"computed".to_string()));
//! assert_eq!(map.get(&1), Some(&"computed".to_string()));
//! assert_eq!(runs.load(Ordering::SeqCst), 1);
//! ```

use std::borrow::Borrow;
use std::fmt;

use super::{RedBlackTree, ReferenceCounter, TreeMap};
use crate::control::Thunk;

// =============================================================================
// DelayMap Definition
// =============================================================================

/// A persistent ordered map from keys to memoizing suspensions.
///
/// Structural sharing extends to the suspensions themselves: maps derived
/// from one another share thunks, so forcing a value through one version
/// memoizes it for every version that shares the entry.
///
/// # Examples
///
/// ```rust
/// use evergreen::persistent::DelayMap;
///
/// let map = DelayMap::new().insert_lazy(1, || 6 * 7);
/// let extended = map.insert(2, 0);
///
/// // Forcing through one version memoizes for the other
/// assert_eq!(extended.get(&1), Some(&42));
/// assert_eq!(map.get(&1), Some(&42));
/// ```
pub struct DelayMap<K, V> {
    tree: RedBlackTree<K, Thunk<V>>,
}

impl<K, V> Clone for DelayMap<K, V> {
    /// Returns a map sharing the entire structure, suspensions included;
    /// O(1).
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
        }
    }
}

impl<K, V> Default for DelayMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> DelayMap<K, V> {
    /// Creates a new empty map.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: RedBlackTree::new(),
        }
    }

    /// Returns `true` if the map contains no entries. Forces nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of entries. Forces nothing.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }
}

// =============================================================================
// Reads
// =============================================================================

impl<K: Clone + Ord, V> DelayMap<K, V> {
    /// Creates a map containing a single already-evaluated entry.
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self {
            tree: RedBlackTree::singleton(key, Thunk::ready(value)),
        }
    }

    /// Returns the value for `key`, forcing exactly that entry.
    ///
    /// Entries other than the one returned are never forced.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(Thunk::force)
    }

    /// Returns the value for `key` (forcing it), or `default` when absent.
    #[must_use]
    pub fn get_with_default<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Clone,
    {
        self.get(key).map_or(default, |value| value.clone())
    }

    /// Returns `true` if the map contains `key`. Forces nothing.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns the keys in ascending order. Forces nothing.
    #[must_use]
    pub fn keys(&self) -> Vec<&K> {
        self.tree
            .entries()
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    /// Returns the entry with the smallest key, forcing exactly that
    /// entry.
    #[must_use]
    pub fn minimum(&self) -> Option<(&K, &V)> {
        self.tree.minimum().map(|(key, thunk)| (key, thunk.force()))
    }

    /// Returns the entry with the largest key, forcing exactly that entry.
    #[must_use]
    pub fn maximum(&self) -> Option<(&K, &V)> {
        self.tree.maximum().map(|(key, thunk)| (key, thunk.force()))
    }

    /// Folds the entries in ascending key order, forcing every value as it
    /// is reached.
    pub fn fold_left<B, F>(&self, init: B, mut combine: F) -> B
    where
        F: FnMut(B, &K, &V) -> B,
    {
        self.tree.fold_left(init, |accumulator, key, thunk| {
            combine(accumulator, key, thunk.force())
        })
    }

    /// Folds the entries in descending key order, forcing every value as it
    /// is reached.
    pub fn fold_right<B, F>(&self, init: B, mut combine: F) -> B
    where
        F: FnMut(&K, &V, B) -> B,
    {
        self.tree.fold_right(init, |key, thunk, accumulator| {
            combine(key, thunk.force(), accumulator)
        })
    }

    /// Collects the entries into a vector in ascending key order, forcing
    /// every value.
    #[must_use]
    pub fn to_list(&self) -> Vec<(K, V)>
    where
        V: Clone,
    {
        self.fold_left(Vec::new(), |mut list, key, value| {
            list.push((key.clone(), value.clone()));
            list
        })
    }
}

// =============================================================================
// Updates
// =============================================================================

impl<K: Clone + Ord, V> DelayMap<K, V> {
    /// Inserts an already-evaluated entry, replacing any existing one.
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        Self {
            tree: self.tree.insert(key, Thunk::ready(value)),
        }
    }

    /// Inserts a suspended entry, replacing any existing one. The
    /// suspension runs the first time the entry is read.
    #[must_use]
    pub fn insert_lazy<F>(&self, key: K, suspension: F) -> Self
    where
        F: FnOnce() -> V + Send + 'static,
    {
        Self {
            tree: self.tree.insert(key, Thunk::defer(suspension)),
        }
    }

    /// Inserts an entry, resolving a collision by running `combine` now.
    ///
    /// On a collision the existing entry is forced immediately and the
    /// combined result is stored already evaluated, so any effects of
    /// `combine` happen exactly once, during this call.
    #[must_use]
    pub fn insert_with_eager<F>(&self, combine: F, key: K, value: V) -> Self
    where
        F: FnOnce(&K, &V, &V) -> V,
    {
        Self {
            tree: self.tree.insert_with(
                |collision_key, new_thunk, old_thunk| {
                    Thunk::ready(combine(collision_key, new_thunk.force(), old_thunk.force()))
                },
                key,
                Thunk::ready(value),
            ),
        }
    }

    /// Removes the entry for `key`, if present. Forces nothing.
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self {
            tree: self.tree.remove(key),
        }
    }

    /// Updates the value for `key` by running `update` now.
    ///
    /// The existing entry is forced immediately. When the key is absent or
    /// `update` returns `None`, the identical map is returned.
    #[must_use]
    pub fn update_with_eager<F, Q>(&self, update: F, key: &Q) -> Self
    where
        F: FnOnce(&K, &V) -> Option<V>,
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self {
            tree: self.tree.update_with(
                |entry_key, thunk| update(entry_key, thunk.force()).map(Thunk::ready),
                key,
            ),
        }
    }

    /// Applies a possibly effectful function to every entry, forcing each
    /// input and running the function now, in ascending key order.
    ///
    /// The results are stored already evaluated.
    #[must_use]
    pub fn map_with_key_eager<W, F>(&self, mut transform: F) -> DelayMap<K, W>
    where
        F: FnMut(&K, &V) -> W,
    {
        DelayMap {
            tree: self
                .tree
                .map_with_key(|key, thunk| Thunk::ready(transform(key, thunk.force()))),
        }
    }
}

// =============================================================================
// Lazy Combinators
// =============================================================================

impl<K, V> DelayMap<K, V>
where
    K: Clone + Ord + Send + 'static,
    V: Send + Sync + 'static,
{
    /// Inserts an entry, resolving a collision with a pure function,
    /// lazily.
    ///
    /// On a collision the stored entry becomes a new suspension over both
    /// the new value and the old entry; neither is forced until the
    /// combined entry itself is read.
    #[must_use]
    pub fn insert_with_lazy<F>(&self, combine: F, key: K, value: V) -> Self
    where
        F: FnOnce(&K, &V, &V) -> V + Send + 'static,
    {
        Self {
            tree: self.tree.insert_with(
                |collision_key, new_thunk, old_thunk| {
                    let combine_key = collision_key.clone();
                    let new_thunk = new_thunk.clone();
                    let old_thunk = old_thunk.clone();
                    Thunk::defer(move || combine(&combine_key, new_thunk.force(), old_thunk.force()))
                },
                key,
                Thunk::ready(value),
            ),
        }
    }

    /// Updates the value for `key` with a pure function, lazily.
    ///
    /// The entry is replaced by a suspension that forces the old value,
    /// applies `update`, and falls back to the old value when `update`
    /// returns `None`. Nothing is forced until the entry is read. When the
    /// key is absent the identical map is returned.
    #[must_use]
    pub fn update_with_lazy<F, Q>(&self, update: F, key: &Q) -> Self
    where
        F: FnOnce(&K, &V) -> Option<V> + Send + 'static,
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Clone,
    {
        Self {
            tree: self.tree.update_with(
                |entry_key, thunk| {
                    let update_key = entry_key.clone();
                    let thunk = thunk.clone();
                    Some(Thunk::defer(move || {
                        let current = thunk.force();
                        update(&update_key, current).unwrap_or_else(|| current.clone())
                    }))
                },
                key,
            ),
        }
    }

    /// Applies a pure function to every entry, lazily.
    ///
    /// Every result entry is a fresh suspension composing `transform` over
    /// the input entry; an input is forced only when the corresponding
    /// output is read, at most once.
    #[must_use]
    pub fn map_with_key_lazy<W, F>(&self, transform: F) -> DelayMap<K, W>
    where
        F: Fn(&K, &V) -> W + Send + Sync + 'static,
    {
        let transform = ReferenceCounter::new(transform);
        DelayMap {
            tree: self.tree.map_with_key(|key, thunk| {
                let transform = ReferenceCounter::clone(&transform);
                let transform_key = key.clone();
                let thunk = thunk.clone();
                Thunk::defer(move || transform(&transform_key, thunk.force()))
            }),
        }
    }
}

// =============================================================================
// Map Conversions
// =============================================================================

impl<K, V> DelayMap<K, V>
where
    K: Clone + Ord + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Forces every entry and returns the fully evaluated map.
    ///
    /// Large maps are forced in parallel across worker threads; the result
    /// is the same either way.
    #[must_use]
    pub fn to_map(&self) -> TreeMap<K, V> {
        TreeMap::from_tree(
            self.tree
                .par_map_with_key(|_, thunk: &Thunk<V>| thunk.force().clone()),
        )
    }
}

impl<K: Clone + Ord, V: Clone> From<TreeMap<K, V>> for DelayMap<K, V> {
    /// Wraps every value of the map in an already-evaluated suspension.
    fn from(map: TreeMap<K, V>) -> Self {
        Self {
            tree: map
                .as_tree()
                .map_with_key(|_, value| Thunk::ready(value.clone())),
        }
    }
}

impl<K: Clone + Ord, V> FromIterator<(K, V)> for DelayMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (key, value)| map.insert(key, value))
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K: Clone + Ord, V: PartialEq> PartialEq for DelayMap<K, V> {
    /// Compares the forced pair sequences; this forces every entry of both
    /// maps.
    fn eq(&self, other: &Self) -> bool {
        let ours = self.tree.entries();
        let theirs = other.tree.entries();
        ours.len() == theirs.len()
            && ours
                .iter()
                .zip(theirs.iter())
                .all(|((key_a, thunk_a), (key_b, thunk_b))| {
                    key_a == key_b && thunk_a.force() == thunk_b.force()
                })
    }
}

impl<K: Clone + Ord, V: Eq> Eq for DelayMap<K, V> {}

impl<K: Clone + Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for DelayMap<K, V> {
    /// Formats the map without forcing anything; unevaluated entries show
    /// as `<lazy>`.
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = formatter.debug_map();
        for (key, thunk) in self.tree.entries() {
            match thunk.try_get() {
                Some(value) => map.entry(key, value),
                None => map.entry(key, &"<lazy>"),
            };
        }
        map.finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_map(runs: &Arc<AtomicUsize>) -> DelayMap<i32, i32> {
        (0..8).fold(DelayMap::new(), |map, key| {
            let counter = Arc::clone(runs);
            map.insert_lazy(key, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                key * 10
            })
        })
    }

    #[rstest]
    fn test_get_forces_only_the_returned_entry() {
        let runs = Arc::new(AtomicUsize::new(0));
        let map = counting_map(&runs);

        assert_eq!(map.get(&3), Some(&30));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert_eq!(map.get(&3), Some(&30));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_keys_and_size_force_nothing() {
        let runs = Arc::new(AtomicUsize::new(0));
        let map = counting_map(&runs);

        assert_eq!(map.size(), 8);
        assert_eq!(map.keys().len(), 8);
        assert!(map.contains_key(&0));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn test_to_list_forces_everything_in_order() {
        let runs = Arc::new(AtomicUsize::new(0));
        let map = counting_map(&runs);

        let pairs = map.to_list();
        assert_eq!(pairs.len(), 8);
        assert_eq!(pairs[5], (5, 50));
        assert_eq!(runs.load(Ordering::SeqCst), 8);
    }

    #[rstest]
    fn test_map_with_key_lazy_defers_transform() {
        let runs = Arc::new(AtomicUsize::new(0));
        let map = counting_map(&runs);

        let doubled = map.map_with_key_lazy(|_, value| value * 2);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        assert_eq!(doubled.get(&2), Some(&40));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_map_with_key_eager_runs_now() {
        let runs = Arc::new(AtomicUsize::new(0));
        let map = counting_map(&runs);

        let doubled = map.map_with_key_eager(|_, value| value * 2);
        assert_eq!(runs.load(Ordering::SeqCst), 8);
        assert_eq!(doubled.get(&2), Some(&40));
    }

    #[rstest]
    fn test_debug_never_forces() {
        let runs = Arc::new(AtomicUsize::new(0));
        let map = counting_map(&runs);

        let rendered = format!("{map:?}");
        assert!(rendered.contains("<lazy>"));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn test_round_trip_through_tree_map() {
        let eager: TreeMap<i32, i32> = (0..10).map(|key| (key, key * key)).collect();
        let delayed: DelayMap<i32, i32> = DelayMap::from(eager.clone());
        assert_eq!(delayed.to_map(), eager);
    }
}

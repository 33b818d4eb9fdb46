//! Persistent (immutable) ordered map.
//!
//! This module provides [`TreeMap`], a persistent ordered map over the
//! red-black tree in [`tree`](super::RedBlackTree). The map carries no state
//! of its own: it wraps a tree and presents the domain-oriented surface —
//! set-theoretic combination, inversion, submap tests, effectful traversal,
//! unfolding, and range queries.
//!
//! Equality, ordering, hashing and formatting are all defined by the sorted
//! sequence of key-value pairs, so two maps built through different
//! insertion orders are equal exactly when they hold the same pairs.
//!
//! # Examples
//!
//! ```rust
//! use evergreen::persistent::TreeMap;
//!
//! let left = TreeMap::new().insert(1, 10).insert(2, 20);
//! let right = TreeMap::new().insert(2, 3).insert(3, 4);
//!
//! // Left-biased union with a merge function on collisions
//! let merged = left.union_with(|a, b| a + b, &right);
//! assert_eq!(merged.to_list(), vec![(1, 10), (2, 23), (3, 4)]);
//! ```

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::RedBlackTree;
use crate::typeclass::{Foldable, Functor, Traversable, TypeConstructor};

// =============================================================================
// TreeMap Definition
// =============================================================================

/// A persistent (immutable) ordered map.
///
/// `TreeMap` is a thin wrapper over [`RedBlackTree`]; every operation
/// returns a new map sharing unchanged structure with its input, and
/// `Clone` is O(1).
///
/// # Time Complexity
///
/// | Operation      | Complexity        |
/// |----------------|-------------------|
/// | `new`          | O(1)              |
/// | `get`          | O(log N)          |
/// | `insert`       | O(log N)          |
/// | `remove`       | O(log N)          |
/// | `size`         | O(N)              |
/// | `union`        | O(M log(N + M))   |
/// | `query`        | O(log N + K)      |
///
/// # Examples
///
/// ```rust
/// use evergreen::persistent::TreeMap;
///
/// let map = TreeMap::new()
///     .insert(3, "three")
///     .insert(1, "one")
///     .insert(2, "two");
///
/// let keys: Vec<&i32> = map.keys().collect();
/// assert_eq!(keys, vec![&1, &2, &3]);
/// ```
pub struct TreeMap<K, V> {
    tree: RedBlackTree<K, V>,
}

impl<K, V> Clone for TreeMap<K, V> {
    /// Returns a map sharing the entire structure; O(1).
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
        }
    }
}

impl<K, V> Default for TreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TreeMap<K, V> {
    /// Creates a new empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::TreeMap;
    ///
    /// let map: TreeMap<i32, String> = TreeMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: RedBlackTree::new(),
        }
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of entries.
    ///
    /// # Complexity
    ///
    /// O(N); the map does not cache its size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    pub(crate) fn from_tree(tree: RedBlackTree<K, V>) -> Self {
        Self { tree }
    }

    pub(crate) fn as_tree(&self) -> &RedBlackTree<K, V> {
        &self.tree
    }
}

// =============================================================================
// Lookup and Update Operations
// =============================================================================

impl<K: Clone + Ord, V: Clone> TreeMap<K, V> {
    /// Creates a map containing a single entry.
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self {
            tree: RedBlackTree::singleton(key, value),
        }
    }

    /// Returns a reference to the value for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::TreeMap;
    ///
    /// let map = TreeMap::new().insert("hello".to_string(), 42);
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key)
    }

    /// Returns the value for `key`, or `default` when absent.
    #[must_use]
    pub fn get_with_default<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).map_or(default, |value| value.clone())
    }

    /// Returns `true` if the map contains `key`.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Inserts an entry, replacing any existing value for the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::TreeMap;
    ///
    /// let map = TreeMap::new().insert(1, "one");
    /// let updated = map.insert(1, "ONE");
    ///
    /// assert_eq!(map.get(&1), Some(&"one"));     // Original unchanged
    /// assert_eq!(updated.get(&1), Some(&"ONE")); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        Self {
            tree: self.tree.insert(key, value),
        }
    }

    /// Inserts an entry, combining with any existing value.
    ///
    /// On a collision the stored value becomes
    /// `combine(&key, &new_value, &old_value)`.
    #[must_use]
    pub fn insert_with<F>(&self, combine: F, key: K, value: V) -> Self
    where
        F: FnOnce(&K, &V, &V) -> V,
    {
        Self {
            tree: self.tree.insert_with(combine, key, value),
        }
    }

    /// Updates the value for `key` in place when the key is present and the
    /// function produces a replacement; otherwise returns the identical map.
    #[must_use]
    pub fn update_with<F, Q>(&self, update: F, key: &Q) -> Self
    where
        F: FnOnce(&K, &V) -> Option<V>,
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self {
            tree: self.tree.update_with(update, key),
        }
    }

    /// Removes the entry for `key`, if present.
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

    /// Returns the entry with the smallest key.
    #[must_use]
    pub fn minimum(&self) -> Option<(&K, &V)> {
        self.tree.minimum()
    }

    /// Returns the entry with the largest key.
    #[must_use]
    pub fn maximum(&self) -> Option<(&K, &V)> {
        self.tree.maximum()
    }
}

// =============================================================================
// Iteration
// =============================================================================

impl<K: Clone + Ord, V: Clone> TreeMap<K, V> {
    /// Returns an iterator over entries in ascending key order.
    #[must_use]
    pub fn iter(&self) -> TreeMapIterator<'_, K, V> {
        TreeMapIterator {
            entries: self.tree.entries(),
            current_index: 0,
        }
    }

    /// Returns an iterator over keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values in ascending key order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// Collects the entries into a vector in ascending key order.
    #[must_use]
    pub fn to_list(&self) -> Vec<(K, V)> {
        self.tree.fold_left(Vec::new(), |mut list, key, value| {
            list.push((key.clone(), value.clone()));
            list
        })
    }

    /// Folds the entries in ascending key order.
    pub fn fold_left_with_key<B, F>(&self, init: B, combine: F) -> B
    where
        F: FnMut(B, &K, &V) -> B,
    {
        self.tree.fold_left(init, combine)
    }

    /// Folds the entries in descending key order.
    pub fn fold_right_with_key<B, F>(&self, init: B, combine: F) -> B
    where
        F: FnMut(&K, &V, B) -> B,
    {
        self.tree.fold_right(init, combine)
    }

    /// Folds the entries without a seed; returns `None` on an empty map.
    pub fn reduce_left<F>(&self, combine: F) -> Option<(K, V)>
    where
        F: FnMut((K, V), (K, V)) -> (K, V),
    {
        self.tree.reduce_left(combine)
    }

    /// Folds the entries from the right without a seed; returns `None` on an
    /// empty map.
    pub fn reduce_right<F>(&self, combine: F) -> Option<(K, V)>
    where
        F: FnMut((K, V), (K, V)) -> (K, V),
    {
        self.tree.reduce_right(combine)
    }

    /// Returns the first entry, in ascending key order, satisfying the
    /// predicate.
    pub fn find_left<F>(&self, predicate: F) -> Option<(&K, &V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.tree.find_left(predicate)
    }

    /// Returns the last entry, in ascending key order, satisfying the
    /// predicate.
    pub fn find_right<F>(&self, predicate: F) -> Option<(&K, &V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.tree.find_right(predicate)
    }

    /// Returns `true` if any entry satisfies the predicate.
    pub fn exists<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.tree.exists(predicate)
    }

    /// Returns `true` if every entry satisfies the predicate.
    pub fn for_all<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.tree.for_all(predicate)
    }

    /// Applies an action to every entry in ascending key order.
    pub fn for_each<F>(&self, action: F)
    where
        F: FnMut(&K, &V),
    {
        self.tree.for_each(action);
    }

    /// Counts the entries satisfying the predicate.
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.tree.count(predicate)
    }

    /// Applies a function to every entry, keeping keys and shape.
    #[must_use]
    pub fn map_with_key<W, F>(&self, transform: F) -> TreeMap<K, W>
    where
        F: FnMut(&K, &V) -> W,
    {
        TreeMap {
            tree: self.tree.map_with_key(transform),
        }
    }

    /// Collects the entries the probe places in range, in ascending key
    /// order, pruning subtrees the three-way comparison rules out.
    #[must_use]
    pub fn query<P>(&self, probe: P) -> Vec<(&K, &V)>
    where
        P: FnMut(&K) -> Ordering,
    {
        self.tree.query(probe)
    }

    /// Applies an action to every entry the probe places in range.
    pub fn query_with<P, F>(&self, probe: P, action: F)
    where
        P: FnMut(&K) -> Ordering,
        F: FnMut(&K, &V),
    {
        self.tree.query_with(probe, action);
    }
}

// =============================================================================
// Parallel Operations
// =============================================================================

impl<K, V> TreeMap<K, V>
where
    K: Clone + Ord + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Applies a pure function to every entry, splitting the work across
    /// worker threads when the map is large enough.
    ///
    /// The result equals [`map_with_key`](Self::map_with_key) for the same
    /// input.
    #[must_use]
    pub fn par_map_with_key<W, F>(&self, transform: F) -> TreeMap<K, W>
    where
        W: Send + Sync,
        F: Fn(&K, &V) -> W + Sync,
    {
        TreeMap {
            tree: self.tree.par_map_with_key(transform),
        }
    }

    /// Counts the entries satisfying a pure predicate, in parallel when the
    /// map is large enough.
    #[must_use]
    pub fn par_count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K, &V) -> bool + Sync,
    {
        self.tree.par_count(predicate)
    }

    /// Returns the entry whose value minimizes a pure comparator, in
    /// parallel when the map is large enough. Ties keep the entry earliest
    /// in key order.
    #[must_use]
    pub fn minimum_value_by<F>(&self, compare: F) -> Option<(&K, &V)>
    where
        F: Fn(&V, &V) -> Ordering + Sync,
    {
        self.tree
            .par_minimum_by(move |_, left_value, _, right_value| compare(left_value, right_value))
    }

    /// Returns the entry whose value maximizes a pure comparator, in
    /// parallel when the map is large enough. Ties keep the entry earliest
    /// in key order.
    #[must_use]
    pub fn maximum_value_by<F>(&self, compare: F) -> Option<(&K, &V)>
    where
        F: Fn(&V, &V) -> Ordering + Sync,
    {
        self.tree
            .par_maximum_by(move |_, left_value, _, right_value| compare(left_value, right_value))
    }
}

// =============================================================================
// Set-Theoretic Operations
// =============================================================================

impl<K: Clone + Ord, V: Clone> TreeMap<K, V> {
    /// Returns the left-biased union: on a key collision the value of
    /// `self` wins.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::TreeMap;
    ///
    /// let left = TreeMap::new().insert(1, "left");
    /// let right = TreeMap::new().insert(1, "right").insert(2, "only");
    ///
    /// let merged = left.union(&right);
    /// assert_eq!(merged.get(&1), Some(&"left"));
    /// assert_eq!(merged.get(&2), Some(&"only"));
    /// ```
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.union_with_key(|_, left_value, _| left_value.clone(), other)
    }

    /// Returns the union, resolving collisions with a function over the two
    /// values: `combine(&value_from_self, &value_from_other)`.
    #[must_use]
    pub fn union_with<F>(&self, mut combine: F, other: &Self) -> Self
    where
        F: FnMut(&V, &V) -> V,
    {
        self.union_with_key(
            |_, left_value, right_value| combine(left_value, right_value),
            other,
        )
    }

    /// Returns the union, resolving collisions with
    /// `combine(&key, &value_from_self, &value_from_other)`.
    ///
    /// The shallower operand is folded into the deeper one to cut the work;
    /// when the fold direction is reversed the arguments to `combine` are
    /// swapped back, so the function always sees `self`'s value first.
    #[must_use]
    pub fn union_with_key<F>(&self, mut combine: F, other: &Self) -> Self
    where
        F: FnMut(&K, &V, &V) -> V,
    {
        if self.tree.black_height() >= other.tree.black_height() {
            other.tree.fold_left(self.clone(), |accumulated, key, value| {
                accumulated.insert_with(
                    |collision_key, new_value, old_value| {
                        combine(collision_key, old_value, new_value)
                    },
                    key.clone(),
                    value.clone(),
                )
            })
        } else {
            self.tree.fold_left(other.clone(), |accumulated, key, value| {
                accumulated.insert_with(
                    |collision_key, new_value, old_value| {
                        combine(collision_key, new_value, old_value)
                    },
                    key.clone(),
                    value.clone(),
                )
            })
        }
    }

    /// Returns the left-biased intersection: the keys present in both maps,
    /// with the values of `self`.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.intersection_with_key(|_, left_value, _| left_value.clone(), other)
    }

    /// Returns the intersection, combining the two values for every shared
    /// key: `combine(&value_from_self, &value_from_other)`.
    #[must_use]
    pub fn intersection_with<F>(&self, mut combine: F, other: &Self) -> Self
    where
        F: FnMut(&V, &V) -> V,
    {
        self.intersection_with_key(
            |_, left_value, right_value| combine(left_value, right_value),
            other,
        )
    }

    /// Returns the intersection, combining with
    /// `combine(&key, &value_from_self, &value_from_other)` on every shared
    /// key.
    #[must_use]
    pub fn intersection_with_key<F>(&self, mut combine: F, other: &Self) -> Self
    where
        F: FnMut(&K, &V, &V) -> V,
    {
        // Keep the right map's values on the shared keys, then merge the
        // left map's values in through in-place updates.
        let shared = other.tree.fold_left(Self::new(), |accumulated, key, value| {
            if self.contains_key(key) {
                accumulated.insert(key.clone(), value.clone())
            } else {
                accumulated
            }
        });
        self.tree.fold_left(shared, |accumulated, key, left_value| {
            accumulated.update_with(
                |collision_key, right_value| Some(combine(collision_key, left_value, right_value)),
                key,
            )
        })
    }

    /// Returns the difference: the entries of `self` whose keys are absent
    /// from `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.difference_with_key(|_, _, _| None, other)
    }

    /// Returns the difference with a merge function over the two values of
    /// every shared key; `Some` keeps the pair with the new value, `None`
    /// drops it.
    #[must_use]
    pub fn difference_with<F>(&self, mut combine: F, other: &Self) -> Self
    where
        F: FnMut(&V, &V) -> Option<V>,
    {
        self.difference_with_key(
            |_, left_value, right_value| combine(left_value, right_value),
            other,
        )
    }

    /// Returns the difference with a keyed merge function; for keys present
    /// in both maps, `Some(v)` retains the pair with value `v` and `None`
    /// drops it. Keys only in `self` are always kept.
    #[must_use]
    pub fn difference_with_key<F>(&self, mut combine: F, other: &Self) -> Self
    where
        F: FnMut(&K, &V, &V) -> Option<V>,
    {
        self.tree
            .fold_left(Self::new(), |accumulated, key, value| {
                match other.get(key) {
                    None => accumulated.insert(key.clone(), value.clone()),
                    Some(other_value) => match combine(key, value, other_value) {
                        Some(kept) => accumulated.insert(key.clone(), kept),
                        None => accumulated,
                    },
                }
            })
    }

    /// Inverts the map: every value becomes a key, mapped to the set of
    /// keys that carried it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::TreeMap;
    /// use std::collections::BTreeSet;
    ///
    /// let map = TreeMap::new().insert(1, 'a').insert(2, 'b').insert(3, 'a');
    /// let inverse = map.invert();
    ///
    /// assert_eq!(inverse.get(&'a'), Some(&BTreeSet::from([1, 3])));
    /// assert_eq!(inverse.get(&'b'), Some(&BTreeSet::from([2])));
    /// ```
    #[must_use]
    pub fn invert(&self) -> TreeMap<V, BTreeSet<K>>
    where
        V: Ord,
    {
        self.tree
            .fold_left(TreeMap::new(), |accumulated, key, value| {
                accumulated.insert_with(
                    |_, new_set, old_set| old_set.union(new_set).cloned().collect(),
                    value.clone(),
                    BTreeSet::from([key.clone()]),
                )
            })
    }

    /// Returns `true` if every entry of `self` appears in `other` with an
    /// equal value.
    #[must_use]
    pub fn is_submap_of(&self, other: &Self) -> bool
    where
        V: PartialEq,
    {
        self.tree
            .for_all(|key, value| other.get(key) == Some(value))
    }

    /// Returns `true` if `self` is a submap of `other` and strictly
    /// smaller.
    #[must_use]
    pub fn is_proper_submap_of(&self, other: &Self) -> bool
    where
        V: PartialEq,
    {
        self.size() < other.size() && self.is_submap_of(other)
    }
}

// =============================================================================
// Unfolding
// =============================================================================

impl<K: Clone + Ord, V: Clone> TreeMap<K, V> {
    /// Builds a map by repeatedly applying `step` to a state until it
    /// returns `None`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::TreeMap;
    ///
    /// let squares = TreeMap::unfold(
    ///     |state: i32| (state < 4).then(|| (state, state * state, state + 1)),
    ///     0,
    /// );
    /// assert_eq!(squares.to_list(), vec![(0, 0), (1, 1), (2, 4), (3, 9)]);
    /// ```
    #[must_use]
    pub fn unfold<S, F>(mut step: F, seed: S) -> Self
    where
        F: FnMut(S) -> Option<(K, V, S)>,
    {
        let mut map = Self::new();
        let mut state = seed;
        while let Some((key, value, next_state)) = step(state) {
            map = map.insert(key, value);
            state = next_state;
        }
        map
    }

    /// Builds a map by draining a stateful producer until it returns
    /// `None`.
    #[must_use]
    pub fn unfold_with_iter<F>(mut next: F) -> Self
    where
        F: FnMut() -> Option<(K, V)>,
    {
        std::iter::from_fn(|| next()).collect()
    }
}

// =============================================================================
// Effectful Traversal
// =============================================================================

impl<K: Clone + Ord, V: Clone> TreeMap<K, V> {
    /// Traverses the entries in ascending key order with a fallible
    /// function, rebuilding the map inside `Option`.
    pub fn traverse_with_key_option<W, F>(&self, transform: F) -> Option<TreeMap<K, W>>
    where
        F: FnMut(&K, &V) -> Option<W>,
    {
        self.tree
            .traverse_with_key_option(transform)
            .map(|tree| TreeMap { tree })
    }

    /// Traverses the entries in ascending key order with a fallible
    /// function, rebuilding the map inside `Result`.
    ///
    /// # Errors
    ///
    /// Returns the first `Err` the function produces, in ascending key
    /// order.
    pub fn traverse_with_key_result<W, E, F>(&self, transform: F) -> Result<TreeMap<K, W>, E>
    where
        E: Clone,
        F: FnMut(&K, &V) -> Result<W, E>,
    {
        self.tree
            .traverse_with_key_result(transform)
            .map(|tree| TreeMap { tree })
    }
}

// =============================================================================
// Iterator Implementations
// =============================================================================

/// An iterator over the entries of a [`TreeMap`], in ascending key order.
pub struct TreeMapIterator<'a, K, V> {
    entries: Vec<(&'a K, &'a V)>,
    current_index: usize,
}

impl<'a, K, V> Iterator for TreeMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.entries.len() {
            None
        } else {
            let entry = self.entries[self.current_index];
            self.current_index += 1;
            Some(entry)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entries.len().saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

impl<K, V> ExactSizeIterator for TreeMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.entries.len().saturating_sub(self.current_index)
    }
}

/// An owning iterator over the entries of a [`TreeMap`], in ascending key
/// order.
pub struct TreeMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for TreeMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for TreeMapIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<K: Clone + Ord, V: Clone> IntoIterator for TreeMap<K, V> {
    type Item = (K, V);
    type IntoIter = TreeMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        TreeMapIntoIterator {
            entries: TreeMap::to_list(&self).into_iter(),
        }
    }
}

impl<'a, K: Clone + Ord, V: Clone> IntoIterator for &'a TreeMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = TreeMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Clone + Ord, V: Clone> FromIterator<(K, V)> for TreeMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (key, value)| map.insert(key, value))
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K: Clone + Ord, V: Clone + PartialEq> PartialEq for TreeMap<K, V> {
    /// Maps are equal when their sorted pair sequences are equal.
    fn eq(&self, other: &Self) -> bool {
        self.tree.entries() == other.tree.entries()
    }
}

impl<K: Clone + Ord, V: Clone + Eq> Eq for TreeMap<K, V> {}

impl<K: Clone + Ord, V: Clone + PartialOrd> PartialOrd for TreeMap<K, V> {
    /// Maps compare lexicographically over their sorted pair sequences.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<K: Clone + Ord, V: Clone + Ord> Ord for TreeMap<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<K, V> Hash for TreeMap<K, V>
where
    K: Clone + Ord + Hash,
    V: Clone + Hash,
{
    /// Hashes the entry count followed by every pair in key order, so equal
    /// maps hash equally regardless of insertion order.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.size().hash(state);
        for (key, value) in self {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl<K: Clone + Ord + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug for TreeMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Clone + Ord + fmt::Display, V: Clone + fmt::Display> fmt::Display for TreeMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for (key, value) in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{key}: {value}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// Type Class Implementations
// =============================================================================

/// A `TreeMap` is a container of values with the key type fixed.
impl<K, V> TypeConstructor for TreeMap<K, V> {
    type Inner = V;
    type WithType<B> = TreeMap<K, B>;
}

impl<K: Clone + Ord, V: Clone> Functor for TreeMap<K, V> {
    fn fmap<B, F>(self, mut function: F) -> TreeMap<K, B>
    where
        F: FnMut(V) -> B,
    {
        TreeMap {
            tree: self.tree.map_with_key(|_, value| function(value.clone())),
        }
    }

    fn fmap_ref<B, F>(&self, mut function: F) -> TreeMap<K, B>
    where
        F: FnMut(&V) -> B,
    {
        TreeMap {
            tree: self.tree.map_with_key(|_, value| function(value)),
        }
    }
}

impl<K: Clone + Ord, V: Clone> Foldable for TreeMap<K, V> {
    fn fold_left<B, F>(self, init: B, mut function: F) -> B
    where
        F: FnMut(B, V) -> B,
    {
        self.tree.fold_left(init, |accumulator, _, value| {
            function(accumulator, value.clone())
        })
    }

    fn fold_right<B, F>(self, init: B, mut function: F) -> B
    where
        F: FnMut(V, B) -> B,
    {
        self.tree.fold_right(init, |_, value, accumulator| {
            function(value.clone(), accumulator)
        })
    }

    fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn length(&self) -> usize {
        self.tree.size()
    }
}

impl<K: Clone + Ord, V: Clone> Traversable for TreeMap<K, V> {
    fn traverse_option<B, F>(self, mut function: F) -> Option<TreeMap<K, B>>
    where
        F: FnMut(V) -> Option<B>,
    {
        self.traverse_with_key_option(|_, value| function(value.clone()))
    }

    fn traverse_result<B, E, F>(self, mut function: F) -> Result<TreeMap<K, B>, E>
    where
        F: FnMut(V) -> Result<B, E>,
    {
        self.traverse_with_key_result(|_, value| function(value.clone()))
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<K, V> serde::Serialize for TreeMap<K, V>
where
    K: serde::Serialize + Clone + Ord,
    V: serde::Serialize + Clone,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.size()))?;
        for (key, value) in self {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct TreeMapVisitor<K, V> {
    key_marker: std::marker::PhantomData<K>,
    value_marker: std::marker::PhantomData<V>,
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::de::Visitor<'de> for TreeMapVisitor<K, V>
where
    K: serde::Deserialize<'de> + Clone + Ord,
    V: serde::Deserialize<'de> + Clone,
{
    type Value = TreeMap<K, V>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut map = TreeMap::new();
        while let Some((key, value)) = access.next_entry()? {
            map = map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::Deserialize<'de> for TreeMap<K, V>
where
    K: serde::Deserialize<'de> + Clone + Ord,
    V: serde::Deserialize<'de> + Clone,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(TreeMapVisitor {
            key_marker: std::marker::PhantomData,
            value_marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_new_creates_empty() {
        let map: TreeMap<i32, String> = TreeMap::new();
        assert!(map.is_empty());
        assert_eq!(map.size(), 0);
    }

    #[rstest]
    fn test_insert_and_iterate_sorted() {
        let map = TreeMap::new().insert(3, 'c').insert(1, 'a').insert(2, 'b');
        let pairs: Vec<(i32, char)> = map.to_list();
        assert_eq!(pairs, vec![(1, 'a'), (2, 'b'), (3, 'c')]);
    }

    #[rstest]
    fn test_display_in_key_order() {
        let map = TreeMap::new()
            .insert(3, "three".to_string())
            .insert(1, "one".to_string())
            .insert(2, "two".to_string());
        assert_eq!(format!("{map}"), "{1: one, 2: two, 3: three}");
    }

    #[rstest]
    fn test_display_empty() {
        let map: TreeMap<i32, String> = TreeMap::new();
        assert_eq!(format!("{map}"), "{}");
    }

    #[rstest]
    fn test_eq_ignores_insertion_order() {
        let forward: TreeMap<i32, i32> = (0..20).map(|key| (key, key * 2)).collect();
        let backward: TreeMap<i32, i32> = (0..20).rev().map(|key| (key, key * 2)).collect();
        assert_eq!(forward, backward);
    }

    #[rstest]
    fn test_ord_is_lexicographic_over_pairs() {
        let smaller = TreeMap::new().insert(1, 1);
        let larger = TreeMap::new().insert(1, 1).insert(2, 2);
        assert!(smaller < larger);

        let by_value = TreeMap::new().insert(1, 0);
        assert!(by_value < smaller);
    }

    #[rstest]
    fn test_union_with_merges_collisions() {
        let left = TreeMap::new().insert(1, 10).insert(2, 20);
        let right = TreeMap::new().insert(2, 3).insert(3, 4);
        let merged = left.union_with(|a, b| a + b, &right);
        assert_eq!(merged.to_list(), vec![(1, 10), (2, 23), (3, 4)]);
    }

    #[rstest]
    fn test_union_swaps_arguments_when_folding_reversed() {
        // Make the left operand much shallower so it gets folded into the
        // right one; the merge function must still see self's value first.
        let left = TreeMap::new().insert(0, "left".to_string());
        let right: TreeMap<i32, String> = (0..100).map(|key| (key, "right".to_string())).collect();

        let merged = left.union_with_key(|_, from_left, from_right| {
            format!("{from_left}/{from_right}")
        }, &right);
        assert_eq!(merged.get(&0), Some(&"left/right".to_string()));
    }

    #[rstest]
    fn test_intersection_keeps_left_values_by_default() {
        let left = TreeMap::new().insert(1, "L1").insert(2, "L2");
        let right = TreeMap::new().insert(2, "R2").insert(3, "R3");
        let shared = left.intersection(&right);
        assert_eq!(shared.to_list(), vec![(2, "L2")]);
    }

    #[rstest]
    fn test_difference_with_key_keeps_or_drops() {
        let left = TreeMap::new().insert(1, 1).insert(2, 2).insert(3, 3);
        let right = TreeMap::new().insert(2, 20).insert(3, 3);
        let kept = left.difference_with_key(
            |_, from_left, from_right| (from_left != from_right).then(|| from_left + from_right),
            &right,
        );
        assert_eq!(kept.to_list(), vec![(1, 1), (2, 22)]);
    }

    #[rstest]
    fn test_submap_checks() {
        let small = TreeMap::new().insert(1, 'a');
        let large = TreeMap::new().insert(1, 'a').insert(2, 'b');
        assert!(small.is_submap_of(&large));
        assert!(small.is_proper_submap_of(&large));
        assert!(large.is_submap_of(&large));
        assert!(!large.is_proper_submap_of(&large));
        assert!(!large.is_submap_of(&small));
    }

    #[rstest]
    fn test_traverse_with_key_option() {
        let map = TreeMap::new()
            .insert(1, "1".to_string())
            .insert(2, "2".to_string());
        let parsed = map.traverse_with_key_option(|_, value| value.parse::<i32>().ok());
        assert_eq!(parsed.unwrap().to_list(), vec![(1, 1), (2, 2)]);

        let broken = map
            .insert(3, "x".to_string())
            .traverse_with_key_option(|_, value| value.parse::<i32>().ok());
        assert!(broken.is_none());
    }

    #[rstest]
    fn test_traverse_with_key_result_reports_first_error() {
        let map = TreeMap::new()
            .insert(1, "x".to_string())
            .insert(2, "y".to_string());
        let outcome: Result<TreeMap<i32, i32>, String> =
            map.traverse_with_key_result(|key, _| Err(format!("bad {key}")));
        assert_eq!(outcome, Err("bad 1".to_string()));
    }

    #[rstest]
    fn test_query_returns_range() {
        let map: TreeMap<i32, i32> = (0..50).map(|key| (key, key)).collect();
        let range: Vec<i32> = map
            .query(|key| {
                if *key < 10 {
                    std::cmp::Ordering::Less
                } else if *key > 12 {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .into_iter()
            .map(|(key, _)| *key)
            .collect();
        assert_eq!(range, vec![10, 11, 12]);
    }
}

//! Persistent (immutable) red-black tree.
//!
//! This module provides [`RedBlackTree`], the balanced ordered tree that
//! [`TreeMap`](super::TreeMap) and [`DelayMap`](super::DelayMap) are built
//! on. It offers the primitive persistent operations (lookup, insert,
//! update, remove, ordered folds and queries) and the fork-join parallel
//! walks used by the maps for pure transformations.
//!
//! # Invariants
//!
//! Every externally observable tree satisfies:
//!
//! 1. **Search order**: for every node, all keys in the left subtree compare
//!    less than the node key, and all keys in the right subtree greater.
//! 2. **No red-red**: a red node never has a red child.
//! 3. **Uniform black height**: every path from the root to a leaf crosses
//!    the same number of black nodes.
//!
//! These bound the height at O(log N), so lookup, insert and remove are
//! O(log N) in time and allocated nodes.
//!
//! # Deletion
//!
//! Removal uses a four-color scheme: during the descent a subtree can
//! temporarily carry a **double-black** marker (a `DoubleBlack` node or a
//! `DoubleBlackLeaf`), standing for one missing unit of black height. Every
//! rebuild on the way back up passes through `rotate`, which either absorbs
//! the marker locally or pushes it one level up; `redden` converts a marker
//! that reaches the root back into an ordinary tree. Double-black values
//! never escape into a public tree.
//!
//! # Parallel walks
//!
//! `par_map_with_key`, `par_count`, `par_minimum_by` and `par_maximum_by`
//! split subtrees across scoped worker threads once the tree clears the
//! size threshold, handing each side of a split half the remaining worker
//! budget and joining results through single-shot channels. The results are
//! identical to the sequential operations; only the schedule differs.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::mpsc;
use std::thread;

use super::ReferenceCounter;
use crate::parallel;
use crate::typeclass::Applicative;

// =============================================================================
// Color and Node Definitions
// =============================================================================

/// Node color. `DoubleBlack` appears only transiently inside `remove`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Color {
    Red,
    Black,
    DoubleBlack,
}

/// Shared handle to a subtree.
type Link<K, V> = ReferenceCounter<Tree<K, V>>;

/// Internal tree structure.
///
/// `DoubleBlackLeaf` is the leaf-shaped double-black marker; like the
/// `DoubleBlack` color it exists only while a removal is in flight.
enum Tree<K, V> {
    Leaf,
    DoubleBlackLeaf,
    Node {
        color: Color,
        left: Link<K, V>,
        key: K,
        value: V,
        right: Link<K, V>,
    },
}

impl<K, V> Tree<K, V> {
    const fn is_red(&self) -> bool {
        matches!(self, Self::Node { color: Color::Red, .. })
    }

    const fn is_black_node(&self) -> bool {
        matches!(self, Self::Node { color: Color::Black, .. })
    }

    const fn is_double_black(&self) -> bool {
        matches!(
            self,
            Self::DoubleBlackLeaf | Self::Node { color: Color::DoubleBlack, .. }
        )
    }
}

// =============================================================================
// RedBlackTree Definition
// =============================================================================

/// A persistent (immutable) red-black tree of key-value pairs.
///
/// All operations return new trees that share unchanged subtrees with their
/// input; `Clone` is O(1).
///
/// # Time Complexity
///
/// | Operation        | Complexity   |
/// |------------------|--------------|
/// | `new`            | O(1)         |
/// | `is_empty`       | O(1)         |
/// | `size`           | O(N)         |
/// | `get`            | O(log N)     |
/// | `insert`         | O(log N)     |
/// | `remove`         | O(log N)     |
/// | `minimum`/`maximum` | O(log N)  |
/// | `fold_left` etc. | O(N)         |
/// | `query`          | O(log N + M) |
///
/// # Examples
///
/// ```rust
/// use evergreen::persistent::RedBlackTree;
///
/// let tree = RedBlackTree::new()
///     .insert(3, "three")
///     .insert(1, "one")
///     .insert(2, "two");
///
/// assert_eq!(tree.get(&2), Some(&"two"));
/// assert_eq!(tree.size(), 3);
///
/// // The original tree is preserved by every operation
/// let smaller = tree.remove(&1);
/// assert_eq!(tree.size(), 3);
/// assert_eq!(smaller.size(), 2);
/// ```
pub struct RedBlackTree<K, V> {
    root: Link<K, V>,
}

impl<K, V> Clone for RedBlackTree<K, V> {
    /// Returns a tree sharing the entire structure; O(1).
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<K, V> Default for RedBlackTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> RedBlackTree<K, V> {
    /// Creates a new empty tree.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::RedBlackTree;
    ///
    /// let tree: RedBlackTree<i32, String> = RedBlackTree::new();
    /// assert!(tree.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ReferenceCounter::new(Tree::Leaf),
        }
    }

    /// Returns `true` if the tree contains no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(&*self.root, Tree::Leaf)
    }

    /// Returns the number of entries.
    ///
    /// # Complexity
    ///
    /// O(N); the tree does not cache its size.
    #[must_use]
    pub fn size(&self) -> usize {
        Self::size_node(&self.root)
    }

    fn size_node(tree: &Link<K, V>) -> usize {
        match &**tree {
            Tree::Node { left, right, .. } => 1 + Self::size_node(left) + Self::size_node(right),
            _ => 0,
        }
    }

    /// Returns the number of black nodes on the path from the root to the
    /// leftmost leaf.
    ///
    /// By the uniform-black-height invariant this equals the black count of
    /// every root-to-leaf path. It is the size heuristic the parallel walks
    /// dispatch on.
    #[must_use]
    pub fn black_height(&self) -> usize {
        let mut height = 0;
        let mut current: &Tree<K, V> = &self.root;
        while let Tree::Node { color, left, .. } = current {
            if *color == Color::Black {
                height += 1;
            }
            current = &**left;
        }
        height
    }

    /// Returns the entry with the smallest key.
    #[must_use]
    pub fn minimum(&self) -> Option<(&K, &V)> {
        Self::minimum_node(&self.root)
    }

    fn minimum_node(tree: &Link<K, V>) -> Option<(&K, &V)> {
        match &**tree {
            Tree::Node {
                left, key, value, ..
            } => Self::minimum_node(left).or(Some((key, value))),
            _ => None,
        }
    }

    /// Returns the entry with the largest key.
    #[must_use]
    pub fn maximum(&self) -> Option<(&K, &V)> {
        Self::maximum_node(&self.root)
    }

    fn maximum_node(tree: &Link<K, V>) -> Option<(&K, &V)> {
        match &**tree {
            Tree::Node {
                right, key, value, ..
            } => Self::maximum_node(right).or(Some((key, value))),
            _ => None,
        }
    }
}

// =============================================================================
// Lookup and Update Operations
// =============================================================================

impl<K: Clone + Ord, V: Clone> RedBlackTree<K, V> {
    /// Creates a tree containing a single entry.
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }

    /// Returns a reference to the value for `key`.
    ///
    /// The key may be any borrowed form of the tree's key type, provided the
    /// orderings agree.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::RedBlackTree;
    ///
    /// let tree = RedBlackTree::new().insert("hello".to_string(), 42);
    ///
    /// assert_eq!(tree.get("hello"), Some(&42));
    /// assert_eq!(tree.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::get_node(&self.root, key)
    }

    fn get_node<'a, Q>(tree: &'a Link<K, V>, key: &Q) -> Option<&'a V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match &**tree {
            Tree::Node {
                left,
                key: node_key,
                value,
                right,
                ..
            } => match key.cmp(node_key.borrow()) {
                Ordering::Less => Self::get_node(left, key),
                Ordering::Greater => Self::get_node(right, key),
                Ordering::Equal => Some(value),
            },
            _ => None,
        }
    }

    /// Returns `true` if the tree contains `key`.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts an entry, replacing the value (and stored key) if the key is
    /// already present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::RedBlackTree;
    ///
    /// let tree = RedBlackTree::new().insert(1, "one");
    /// let updated = tree.insert(1, "ONE");
    ///
    /// assert_eq!(tree.get(&1), Some(&"one"));    // Original unchanged
    /// assert_eq!(updated.get(&1), Some(&"ONE")); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        Self {
            root: Self::link(Self::blacken(Self::insert_node(&self.root, key, value))),
        }
    }

    /// Inserts an entry, combining with any existing value.
    ///
    /// If `key` is absent the entry is inserted as given. If it is present
    /// with old value `old`, the stored value becomes
    /// `combine(&key, &value, &old)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::RedBlackTree;
    ///
    /// let tree = RedBlackTree::new().insert(1, 10);
    /// let summed = tree.insert_with(|_, new, old| new + old, 1, 5);
    /// assert_eq!(summed.get(&1), Some(&15));
    /// ```
    #[must_use]
    pub fn insert_with<F>(&self, combine: F, key: K, value: V) -> Self
    where
        F: FnOnce(&K, &V, &V) -> V,
    {
        Self {
            root: Self::link(Self::blacken(Self::insert_with_node(
                &self.root, combine, key, value,
            ))),
        }
    }

    /// Updates the value for `key` in place, when both the key is present
    /// and the function produces a replacement.
    ///
    /// If `key` is absent, or `update` returns `None`, the result is the
    /// identical tree: the root pointer is shared, so no allocation happens.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::RedBlackTree;
    ///
    /// let tree = RedBlackTree::new().insert(1, 10).insert(2, 20);
    ///
    /// let doubled = tree.update_with(|_, v| Some(v * 2), &1);
    /// assert_eq!(doubled.get(&1), Some(&20));
    ///
    /// let untouched = tree.update_with(|_, _| None::<i32>, &1);
    /// assert_eq!(untouched.get(&1), Some(&10));
    /// ```
    #[must_use]
    pub fn update_with<F, Q>(&self, update: F, key: &Q) -> Self
    where
        F: FnOnce(&K, &V) -> Option<V>,
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match Self::update_node(&self.root, update, key) {
            Some(updated) => Self {
                root: Self::link(updated),
            },
            None => self.clone(),
        }
    }

    /// Removes the entry for `key`, if present.
    ///
    /// Removing an absent key returns the identical tree.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::RedBlackTree;
    ///
    /// let tree = RedBlackTree::new().insert(1, "one").insert(2, "two");
    /// let removed = tree.remove(&1);
    ///
    /// assert_eq!(tree.size(), 2);    // Original unchanged
    /// assert_eq!(removed.size(), 1);
    /// assert_eq!(removed.get(&1), None);
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if !self.contains_key(key) {
            return self.clone();
        }

        let descended = Self::link(Self::remove_node(&Self::redden(&self.root), key));
        let root = Self::redden(&descended);
        debug_assert!(
            !root.is_double_black(),
            "removal must resolve every double-black marker below the root"
        );
        Self { root }
    }

    // =========================================================================
    // Construction Helpers
    // =========================================================================

    fn link(tree: Tree<K, V>) -> Link<K, V> {
        ReferenceCounter::new(tree)
    }

    /// Builds a node that shares both children and clones the entry.
    fn rebuild(
        color: Color,
        left: &Link<K, V>,
        key: &K,
        value: &V,
        right: &Link<K, V>,
    ) -> Tree<K, V> {
        Tree::Node {
            color,
            left: left.clone(),
            key: key.clone(),
            value: value.clone(),
            right: right.clone(),
        }
    }

    // =========================================================================
    // Insertion Internals
    // =========================================================================

    fn insert_node(tree: &Link<K, V>, key: K, value: V) -> Tree<K, V> {
        match &**tree {
            Tree::Node {
                color,
                left,
                key: node_key,
                value: node_value,
                right,
            } => match key.cmp(node_key) {
                Ordering::Less => Self::balance(
                    *color,
                    &Self::link(Self::insert_node(left, key, value)),
                    node_key,
                    node_value,
                    right,
                ),
                Ordering::Greater => Self::balance(
                    *color,
                    left,
                    node_key,
                    node_value,
                    &Self::link(Self::insert_node(right, key, value)),
                ),
                Ordering::Equal => Tree::Node {
                    color: *color,
                    left: left.clone(),
                    key,
                    value,
                    right: right.clone(),
                },
            },
            _ => Self::fresh_red(key, value),
        }
    }

    fn insert_with_node<F>(tree: &Link<K, V>, combine: F, key: K, value: V) -> Tree<K, V>
    where
        F: FnOnce(&K, &V, &V) -> V,
    {
        match &**tree {
            Tree::Node {
                color,
                left,
                key: node_key,
                value: node_value,
                right,
            } => match key.cmp(node_key) {
                Ordering::Less => Self::balance(
                    *color,
                    &Self::link(Self::insert_with_node(left, combine, key, value)),
                    node_key,
                    node_value,
                    right,
                ),
                Ordering::Greater => Self::balance(
                    *color,
                    left,
                    node_key,
                    node_value,
                    &Self::link(Self::insert_with_node(right, combine, key, value)),
                ),
                Ordering::Equal => {
                    let combined = combine(&key, &value, node_value);
                    Tree::Node {
                        color: *color,
                        left: left.clone(),
                        key,
                        value: combined,
                        right: right.clone(),
                    }
                }
            },
            _ => Self::fresh_red(key, value),
        }
    }

    /// A new red node with leaf children, the shape every insertion bottoms
    /// out in.
    fn fresh_red(key: K, value: V) -> Tree<K, V> {
        let leaf = Self::link(Tree::Leaf);
        Tree::Node {
            color: Color::Red,
            left: leaf.clone(),
            key,
            value,
            right: leaf,
        }
    }

    fn update_node<F, Q>(tree: &Link<K, V>, update: F, key: &Q) -> Option<Tree<K, V>>
    where
        F: FnOnce(&K, &V) -> Option<V>,
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match &**tree {
            Tree::Node {
                color,
                left,
                key: node_key,
                value: node_value,
                right,
            } => match key.cmp(node_key.borrow()) {
                Ordering::Less => Self::update_node(left, update, key).map(|updated| Tree::Node {
                    color: *color,
                    left: Self::link(updated),
                    key: node_key.clone(),
                    value: node_value.clone(),
                    right: right.clone(),
                }),
                Ordering::Greater => {
                    Self::update_node(right, update, key).map(|updated| Tree::Node {
                        color: *color,
                        left: left.clone(),
                        key: node_key.clone(),
                        value: node_value.clone(),
                        right: Self::link(updated),
                    })
                }
                // A value replacement keeps the shape, so no rebalancing.
                Ordering::Equal => update(node_key, node_value).map(|new_value| Tree::Node {
                    color: *color,
                    left: left.clone(),
                    key: node_key.clone(),
                    value: new_value,
                    right: right.clone(),
                }),
            },
            _ => None,
        }
    }

    /// Restores the no-red-red invariant around a freshly rebuilt node.
    ///
    /// Handles the four red-child-with-red-grandchild configurations under a
    /// black parent, plus the two configurations a double-black parent can
    /// acquire during removal (a red child with a red inner grandchild, on
    /// either side). Any other shape is rebuilt unchanged.
    fn balance(
        color: Color,
        left: &Link<K, V>,
        key: &K,
        value: &V,
        right: &Link<K, V>,
    ) -> Tree<K, V> {
        if color == Color::Black {
            if let Tree::Node {
                color: Color::Red,
                left: x_left,
                key: x_key,
                value: x_value,
                right: x_right,
            } = &**left
            {
                // Left child red with a red left grandchild.
                if let Tree::Node {
                    color: Color::Red,
                    left: a,
                    key: w_key,
                    value: w_value,
                    right: b,
                } = &**x_left
                {
                    return Self::rebuild(
                        Color::Red,
                        &Self::link(Self::rebuild(Color::Black, a, w_key, w_value, b)),
                        x_key,
                        x_value,
                        &Self::link(Self::rebuild(Color::Black, x_right, key, value, right)),
                    );
                }
                // Left child red with a red right grandchild.
                if let Tree::Node {
                    color: Color::Red,
                    left: b,
                    key: y_key,
                    value: y_value,
                    right: c,
                } = &**x_right
                {
                    return Self::rebuild(
                        Color::Red,
                        &Self::link(Self::rebuild(Color::Black, x_left, x_key, x_value, b)),
                        y_key,
                        y_value,
                        &Self::link(Self::rebuild(Color::Black, c, key, value, right)),
                    );
                }
            }
            if let Tree::Node {
                color: Color::Red,
                left: x_left,
                key: x_key,
                value: x_value,
                right: x_right,
            } = &**right
            {
                // Right child red with a red left grandchild.
                if let Tree::Node {
                    color: Color::Red,
                    left: b,
                    key: y_key,
                    value: y_value,
                    right: c,
                } = &**x_left
                {
                    return Self::rebuild(
                        Color::Red,
                        &Self::link(Self::rebuild(Color::Black, left, key, value, b)),
                        y_key,
                        y_value,
                        &Self::link(Self::rebuild(Color::Black, c, x_key, x_value, x_right)),
                    );
                }
                // Right child red with a red right grandchild.
                if let Tree::Node {
                    color: Color::Red,
                    left: c,
                    key: z_key,
                    value: z_value,
                    right: d,
                } = &**x_right
                {
                    return Self::rebuild(
                        Color::Red,
                        &Self::link(Self::rebuild(Color::Black, left, key, value, x_left)),
                        x_key,
                        x_value,
                        &Self::link(Self::rebuild(Color::Black, c, z_key, z_value, d)),
                    );
                }
            }
        }
        if color == Color::DoubleBlack {
            // Right child red with a red left grandchild: absorbs one black.
            if let Tree::Node {
                color: Color::Red,
                left: x_left,
                key: z_key,
                value: z_value,
                right: x_right,
            } = &**right
                && let Tree::Node {
                    color: Color::Red,
                    left: b,
                    key: y_key,
                    value: y_value,
                    right: c,
                } = &**x_left
            {
                return Self::rebuild(
                    Color::Black,
                    &Self::link(Self::rebuild(Color::Black, left, key, value, b)),
                    y_key,
                    y_value,
                    &Self::link(Self::rebuild(Color::Black, c, z_key, z_value, x_right)),
                );
            }
            // Left child red with a red right grandchild: absorbs one black.
            if let Tree::Node {
                color: Color::Red,
                left: x_left,
                key: x_key,
                value: x_value,
                right: x_right,
            } = &**left
                && let Tree::Node {
                    color: Color::Red,
                    left: b,
                    key: y_key,
                    value: y_value,
                    right: c,
                } = &**x_right
            {
                return Self::rebuild(
                    Color::Black,
                    &Self::link(Self::rebuild(Color::Black, x_left, x_key, x_value, b)),
                    y_key,
                    y_value,
                    &Self::link(Self::rebuild(Color::Black, c, key, value, right)),
                );
            }
        }
        Self::rebuild(color, left, key, value, right)
    }

    /// Recolors the root black when an insertion left it red with a red
    /// child, the only red-red shape that can surface at the root.
    fn blacken(tree: Tree<K, V>) -> Tree<K, V> {
        match tree {
            Tree::Node {
                color: Color::Red,
                left,
                key,
                value,
                right,
            } if left.is_red() || right.is_red() => Tree::Node {
                color: Color::Black,
                left,
                key,
                value,
                right,
            },
            other => other,
        }
    }

    // =========================================================================
    // Removal Internals
    // =========================================================================

    /// Reddens a black root whose children are both black nodes (the
    /// precondition for the removal descent), and converts a double-black
    /// leaf that survived to the root back into a leaf.
    fn redden(tree: &Link<K, V>) -> Link<K, V> {
        match &**tree {
            Tree::DoubleBlackLeaf => Self::link(Tree::Leaf),
            Tree::Node {
                color: Color::Black,
                left,
                key,
                value,
                right,
            } if left.is_black_node() && right.is_black_node() => {
                Self::link(Self::rebuild(Color::Red, left, key, value, right))
            }
            _ => tree.clone(),
        }
    }

    fn remove_node<Q>(tree: &Link<K, V>, key: &Q) -> Tree<K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match &**tree {
            Tree::Leaf => Tree::Leaf,
            Tree::DoubleBlackLeaf => Tree::DoubleBlackLeaf,
            Tree::Node {
                color,
                left,
                key: node_key,
                value,
                right,
            } => {
                // Terminal shape: a leaf node. A red one vanishes; a black
                // one leaves a double-black marker in its place.
                if matches!(&**left, Tree::Leaf) && matches!(&**right, Tree::Leaf) {
                    return if key.cmp(node_key.borrow()) == Ordering::Equal {
                        match color {
                            Color::Red => Tree::Leaf,
                            _ => Tree::DoubleBlackLeaf,
                        }
                    } else {
                        Self::rebuild(*color, left, node_key, value, right)
                    };
                }

                // Terminal shape: a black node whose only child is a red
                // leaf node. Removing the parent promotes the child to
                // black; no marker is needed.
                if *color == Color::Black
                    && matches!(&**right, Tree::Leaf)
                    && let Tree::Node {
                        color: Color::Red,
                        left: child_left,
                        key: child_key,
                        value: child_value,
                        right: child_right,
                    } = &**left
                {
                    return match key.cmp(node_key.borrow()) {
                        Ordering::Less => Self::rebuild(
                            Color::Black,
                            &Self::link(Self::remove_node(left, key)),
                            node_key,
                            value,
                            right,
                        ),
                        Ordering::Equal => Self::rebuild(
                            Color::Black,
                            child_left,
                            child_key,
                            child_value,
                            child_right,
                        ),
                        Ordering::Greater => {
                            Self::rebuild(Color::Black, left, node_key, value, right)
                        }
                    };
                }

                match key.cmp(node_key.borrow()) {
                    Ordering::Less => Self::rotate(
                        *color,
                        &Self::link(Self::remove_node(left, key)),
                        node_key,
                        value,
                        right,
                    ),
                    Ordering::Greater => Self::rotate(
                        *color,
                        left,
                        node_key,
                        value,
                        &Self::link(Self::remove_node(right, key)),
                    ),
                    Ordering::Equal => {
                        let (successor_key, successor_value, pruned_right) =
                            Self::min_delete(right);
                        Self::rotate(
                            *color,
                            left,
                            &successor_key,
                            &successor_value,
                            &Self::link(pruned_right),
                        )
                    }
                }
            }
        }
    }

    /// Removes the leftmost entry of a non-empty subtree, returning it
    /// together with the remaining subtree (which may carry a double-black
    /// marker for the height lost).
    fn min_delete(tree: &Link<K, V>) -> (K, V, Tree<K, V>) {
        if let Tree::Node {
            color,
            left,
            key,
            value,
            right,
        } = &**tree
        {
            if matches!(&**left, Tree::Node { .. }) {
                let (minimum_key, minimum_value, pruned_left) = Self::min_delete(left);
                return (
                    minimum_key,
                    minimum_value,
                    Self::rotate(*color, &Self::link(pruned_left), key, value, right),
                );
            }
            match (color, &**right) {
                (Color::Red, Tree::Leaf) => return (key.clone(), value.clone(), Tree::Leaf),
                (Color::Black, Tree::Leaf) => {
                    return (key.clone(), value.clone(), Tree::DoubleBlackLeaf);
                }
                (
                    Color::Black,
                    Tree::Node {
                        color: Color::Red,
                        left: child_left,
                        key: child_key,
                        value: child_value,
                        right: child_right,
                    },
                ) => {
                    return (
                        key.clone(),
                        value.clone(),
                        Self::rebuild(Color::Black, child_left, child_key, child_value, child_right),
                    );
                }
                _ => {}
            }
        }
        unreachable!("minimum deletion reached a shape the tree invariants rule out")
    }

    /// Re-balances a rebuilt node whose child carries a double-black marker,
    /// absorbing the marker or pushing it one level up.
    ///
    /// Twelve configurations are handled, six symmetric pairs over (parent
    /// color) × (marker side) × (sibling shape); `shed_black` folds the
    /// double-black-node and double-black-leaf flavors of each pair
    /// together. Every other shape is rebuilt unchanged.
    fn rotate(
        color: Color,
        left: &Link<K, V>,
        key: &K,
        value: &V,
        right: &Link<K, V>,
    ) -> Tree<K, V> {
        match color {
            Color::Red => {
                // Marker on the left, black sibling.
                if left.is_double_black()
                    && let Tree::Node {
                        color: Color::Black,
                        left: sibling_left,
                        key: z_key,
                        value: z_value,
                        right: sibling_right,
                    } = &**right
                {
                    return Self::balance(
                        Color::Black,
                        &Self::link(Self::rebuild(
                            Color::Red,
                            &Self::shed_black(left),
                            key,
                            value,
                            sibling_left,
                        )),
                        z_key,
                        z_value,
                        sibling_right,
                    );
                }
                // Marker on the right, black sibling.
                if right.is_double_black()
                    && let Tree::Node {
                        color: Color::Black,
                        left: sibling_left,
                        key: x_key,
                        value: x_value,
                        right: sibling_right,
                    } = &**left
                {
                    return Self::balance(
                        Color::Black,
                        sibling_left,
                        x_key,
                        x_value,
                        &Self::link(Self::rebuild(
                            Color::Red,
                            sibling_right,
                            key,
                            value,
                            &Self::shed_black(right),
                        )),
                    );
                }
            }
            Color::Black => {
                // Marker on the left, black sibling: the parent goes
                // double-black.
                if left.is_double_black()
                    && let Tree::Node {
                        color: Color::Black,
                        left: sibling_left,
                        key: z_key,
                        value: z_value,
                        right: sibling_right,
                    } = &**right
                {
                    return Self::balance(
                        Color::DoubleBlack,
                        &Self::link(Self::rebuild(
                            Color::Red,
                            &Self::shed_black(left),
                            key,
                            value,
                            sibling_left,
                        )),
                        z_key,
                        z_value,
                        sibling_right,
                    );
                }
                // Marker on the right, black sibling.
                if right.is_double_black()
                    && let Tree::Node {
                        color: Color::Black,
                        left: sibling_left,
                        key: x_key,
                        value: x_value,
                        right: sibling_right,
                    } = &**left
                {
                    return Self::balance(
                        Color::DoubleBlack,
                        sibling_left,
                        x_key,
                        x_value,
                        &Self::link(Self::rebuild(
                            Color::Red,
                            sibling_right,
                            key,
                            value,
                            &Self::shed_black(right),
                        )),
                    );
                }
                // Marker on the left, red sibling with black children.
                if left.is_double_black()
                    && let Tree::Node {
                        color: Color::Red,
                        left: sibling_left,
                        key: z_key,
                        value: z_value,
                        right: sibling_right,
                    } = &**right
                    && let Tree::Node {
                        color: Color::Black,
                        left: inner_left,
                        key: y_key,
                        value: y_value,
                        right: inner_right,
                    } = &**sibling_left
                {
                    return Self::rebuild(
                        Color::Black,
                        &Self::link(Self::balance(
                            Color::Black,
                            &Self::link(Self::rebuild(
                                Color::Red,
                                &Self::shed_black(left),
                                key,
                                value,
                                inner_left,
                            )),
                            y_key,
                            y_value,
                            inner_right,
                        )),
                        z_key,
                        z_value,
                        sibling_right,
                    );
                }
                // Marker on the right, red sibling with black children.
                if right.is_double_black()
                    && let Tree::Node {
                        color: Color::Red,
                        left: sibling_left,
                        key: w_key,
                        value: w_value,
                        right: sibling_right,
                    } = &**left
                    && let Tree::Node {
                        color: Color::Black,
                        left: inner_left,
                        key: x_key,
                        value: x_value,
                        right: inner_right,
                    } = &**sibling_right
                {
                    return Self::rebuild(
                        Color::Black,
                        sibling_left,
                        w_key,
                        w_value,
                        &Self::link(Self::balance(
                            Color::Black,
                            inner_left,
                            x_key,
                            x_value,
                            &Self::link(Self::rebuild(
                                Color::Red,
                                inner_right,
                                key,
                                value,
                                &Self::shed_black(right),
                            )),
                        )),
                    );
                }
            }
            Color::DoubleBlack => {}
        }
        Self::rebuild(color, left, key, value, right)
    }

    /// Strips one unit of black from a double-black subtree: a double-black
    /// leaf becomes a leaf, a double-black node becomes black. Other
    /// subtrees are returned unchanged.
    fn shed_black(tree: &Link<K, V>) -> Link<K, V> {
        match &**tree {
            Tree::DoubleBlackLeaf => Self::link(Tree::Leaf),
            Tree::Node {
                color: Color::DoubleBlack,
                left,
                key,
                value,
                right,
            } => Self::link(Self::rebuild(Color::Black, left, key, value, right)),
            _ => tree.clone(),
        }
    }
}

// =============================================================================
// Traversal Operations
// =============================================================================

impl<K: Clone + Ord, V: Clone> RedBlackTree<K, V> {
    /// Folds the entries in ascending key order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::RedBlackTree;
    ///
    /// let tree = RedBlackTree::new().insert(1, 10).insert(2, 20);
    /// let total = tree.fold_left(0, |accumulator, _, value| accumulator + value);
    /// assert_eq!(total, 30);
    /// ```
    pub fn fold_left<B, F>(&self, init: B, mut combine: F) -> B
    where
        F: FnMut(B, &K, &V) -> B,
    {
        Self::fold_left_node(&self.root, init, &mut combine)
    }

    fn fold_left_node<B, F>(tree: &Link<K, V>, accumulator: B, combine: &mut F) -> B
    where
        F: FnMut(B, &K, &V) -> B,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                let accumulator = Self::fold_left_node(left, accumulator, combine);
                let accumulator = combine(accumulator, key, value);
                Self::fold_left_node(right, accumulator, combine)
            }
            _ => accumulator,
        }
    }

    /// Folds the entries in descending key order.
    pub fn fold_right<B, F>(&self, init: B, mut combine: F) -> B
    where
        F: FnMut(&K, &V, B) -> B,
    {
        Self::fold_right_node(&self.root, init, &mut combine)
    }

    fn fold_right_node<B, F>(tree: &Link<K, V>, accumulator: B, combine: &mut F) -> B
    where
        F: FnMut(&K, &V, B) -> B,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                let accumulator = Self::fold_right_node(right, accumulator, combine);
                let accumulator = combine(key, value, accumulator);
                Self::fold_right_node(left, accumulator, combine)
            }
            _ => accumulator,
        }
    }

    /// Folds the entries in ascending key order without a seed; the first
    /// entry starts the accumulator. Returns `None` on an empty tree.
    ///
    /// `combine` receives the accumulated pair first and the next pair
    /// second.
    pub fn reduce_left<F>(&self, mut combine: F) -> Option<(K, V)>
    where
        F: FnMut((K, V), (K, V)) -> (K, V),
    {
        self.fold_left(None, |accumulated, key, value| {
            Some(match accumulated {
                None => (key.clone(), value.clone()),
                Some(current) => combine(current, (key.clone(), value.clone())),
            })
        })
    }

    /// Folds the entries in descending key order without a seed. Returns
    /// `None` on an empty tree.
    ///
    /// `combine` receives the next pair first and the accumulated pair
    /// second.
    pub fn reduce_right<F>(&self, mut combine: F) -> Option<(K, V)>
    where
        F: FnMut((K, V), (K, V)) -> (K, V),
    {
        self.fold_right(None, |key, value, accumulated| {
            Some(match accumulated {
                None => (key.clone(), value.clone()),
                Some(current) => combine((key.clone(), value.clone()), current),
            })
        })
    }

    /// Returns the first entry, in ascending key order, satisfying the
    /// predicate.
    pub fn find_left<F>(&self, mut predicate: F) -> Option<(&K, &V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        Self::find_left_node(&self.root, &mut predicate)
    }

    fn find_left_node<'a, F>(tree: &'a Link<K, V>, predicate: &mut F) -> Option<(&'a K, &'a V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => Self::find_left_node(left, predicate)
                .or_else(|| predicate(key, value).then_some((key, value)))
                .or_else(|| Self::find_left_node(right, predicate)),
            _ => None,
        }
    }

    /// Returns the last entry, in ascending key order, satisfying the
    /// predicate.
    pub fn find_right<F>(&self, mut predicate: F) -> Option<(&K, &V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        Self::find_right_node(&self.root, &mut predicate)
    }

    fn find_right_node<'a, F>(tree: &'a Link<K, V>, predicate: &mut F) -> Option<(&'a K, &'a V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => Self::find_right_node(right, predicate)
                .or_else(|| predicate(key, value).then_some((key, value)))
                .or_else(|| Self::find_right_node(left, predicate)),
            _ => None,
        }
    }

    /// Returns `true` if any entry satisfies the predicate.
    pub fn exists<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        Self::find_left_node(&self.root, &mut predicate).is_some()
    }

    /// Returns `true` if every entry satisfies the predicate.
    pub fn for_all<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        Self::find_left_node(&self.root, &mut |key, value| !predicate(key, value)).is_none()
    }

    /// Applies an action to every entry in ascending key order.
    pub fn for_each<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V),
    {
        self.fold_left((), |(), key, value| action(key, value));
    }

    /// Counts the entries satisfying the predicate.
    pub fn count<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.fold_left(0, |tally, key, value| {
            tally + usize::from(predicate(key, value))
        })
    }

    /// Returns the entry that minimizes the comparator, scanning in
    /// ascending key order; ties keep the earlier entry.
    pub fn minimum_by<F>(&self, mut compare: F) -> Option<(&K, &V)>
    where
        F: FnMut(&K, &V, &K, &V) -> Ordering,
    {
        Self::minimum_by_node(&self.root, &mut compare)
    }

    fn minimum_by_node<'a, F>(tree: &'a Link<K, V>, compare: &mut F) -> Option<(&'a K, &'a V)>
    where
        F: FnMut(&K, &V, &K, &V) -> Ordering,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                let mut best = (key, value);
                if let Some((left_key, left_value)) = Self::minimum_by_node(left, compare)
                    && compare(left_key, left_value, best.0, best.1) != Ordering::Greater
                {
                    best = (left_key, left_value);
                }
                if let Some((right_key, right_value)) = Self::minimum_by_node(right, compare)
                    && compare(best.0, best.1, right_key, right_value) == Ordering::Greater
                {
                    best = (right_key, right_value);
                }
                Some(best)
            }
            _ => None,
        }
    }

    /// Returns the entry that maximizes the comparator, scanning in
    /// ascending key order; ties keep the earlier entry.
    pub fn maximum_by<F>(&self, mut compare: F) -> Option<(&K, &V)>
    where
        F: FnMut(&K, &V, &K, &V) -> Ordering,
    {
        Self::maximum_by_node(&self.root, &mut compare)
    }

    fn maximum_by_node<'a, F>(tree: &'a Link<K, V>, compare: &mut F) -> Option<(&'a K, &'a V)>
    where
        F: FnMut(&K, &V, &K, &V) -> Ordering,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                let mut best = (key, value);
                if let Some((left_key, left_value)) = Self::maximum_by_node(left, compare)
                    && compare(left_key, left_value, best.0, best.1) != Ordering::Less
                {
                    best = (left_key, left_value);
                }
                if let Some((right_key, right_value)) = Self::maximum_by_node(right, compare)
                    && compare(best.0, best.1, right_key, right_value) == Ordering::Less
                {
                    best = (right_key, right_value);
                }
                Some(best)
            }
            _ => None,
        }
    }

    /// Applies a function to every value, keeping keys and shape.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::RedBlackTree;
    ///
    /// let tree = RedBlackTree::new().insert(1, 10).insert(2, 20);
    /// let doubled = tree.map_with_key(|_, value| value * 2);
    /// assert_eq!(doubled.get(&2), Some(&40));
    /// ```
    #[must_use]
    pub fn map_with_key<W, F>(&self, mut transform: F) -> RedBlackTree<K, W>
    where
        F: FnMut(&K, &V) -> W,
    {
        RedBlackTree {
            root: ReferenceCounter::new(Self::map_node(&self.root, &mut transform)),
        }
    }

    fn map_node<W, F>(tree: &Link<K, V>, transform: &mut F) -> Tree<K, W>
    where
        F: FnMut(&K, &V) -> W,
    {
        match &**tree {
            Tree::Leaf => Tree::Leaf,
            Tree::DoubleBlackLeaf => Tree::DoubleBlackLeaf,
            Tree::Node {
                color,
                left,
                key,
                value,
                right,
            } => {
                let mapped_left = Self::map_node(left, transform);
                let mapped_value = transform(key, value);
                let mapped_right = Self::map_node(right, transform);
                Tree::Node {
                    color: *color,
                    left: ReferenceCounter::new(mapped_left),
                    key: key.clone(),
                    value: mapped_value,
                    right: ReferenceCounter::new(mapped_right),
                }
            }
        }
    }

    /// Applies an action to every entry the probe places in range, pruning
    /// subtrees the three-way comparison rules out.
    ///
    /// `probe(k)` returns `Less` when `k` lies below the matching range,
    /// `Greater` when above, and `Equal` when `k` matches. Matching entries
    /// are visited in ascending key order.
    pub fn query_with<P, F>(&self, mut probe: P, mut action: F)
    where
        P: FnMut(&K) -> Ordering,
        F: FnMut(&K, &V),
    {
        Self::query_node(&self.root, &mut probe, &mut action);
    }

    /// Collects the entries the probe places in range, in ascending key
    /// order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::persistent::RedBlackTree;
    ///
    /// let tree = (0..10).fold(RedBlackTree::new(), |tree, k| tree.insert(k, k));
    ///
    /// let matches: Vec<i32> = tree.query(|k| k.cmp(&4))
    ///     .into_iter()
    ///     .map(|(k, _)| *k)
    ///     .collect();
    /// assert_eq!(matches, vec![4]);
    /// ```
    #[must_use]
    pub fn query<P>(&self, mut probe: P) -> Vec<(&K, &V)>
    where
        P: FnMut(&K) -> Ordering,
    {
        let mut results = Vec::new();
        Self::query_node(&self.root, &mut probe, &mut |key, value| {
            results.push((key, value));
        });
        results
    }

    /// Collects every entry in ascending key order.
    ///
    /// This is the pair sequence the maps define their equality, ordering
    /// and formatting over.
    #[must_use]
    pub fn entries(&self) -> Vec<(&K, &V)> {
        let mut entries = Vec::new();
        Self::collect_entries(&self.root, &mut entries);
        entries
    }

    fn collect_entries<'a>(tree: &'a Link<K, V>, entries: &mut Vec<(&'a K, &'a V)>) {
        if let Tree::Node {
            left,
            key,
            value,
            right,
            ..
        } = &**tree
        {
            Self::collect_entries(left, entries);
            entries.push((key, value));
            Self::collect_entries(right, entries);
        }
    }

    fn query_node<'a, P, F>(tree: &'a Link<K, V>, probe: &mut P, action: &mut F)
    where
        P: FnMut(&K) -> Ordering,
        F: FnMut(&'a K, &'a V),
    {
        if let Tree::Node {
            left,
            key,
            value,
            right,
            ..
        } = &**tree
        {
            match probe(key) {
                // The node key is below the range: matches are right only.
                Ordering::Less => Self::query_node(right, probe, action),
                // The node key is above the range: matches are left only.
                Ordering::Greater => Self::query_node(left, probe, action),
                Ordering::Equal => {
                    Self::query_node(left, probe, action);
                    action(key, value);
                    Self::query_node(right, probe, action);
                }
            }
        }
    }
}

// =============================================================================
// Applicative Traversal
// =============================================================================

impl<K: Clone + Ord, V: Clone> RedBlackTree<K, V> {
    /// Traverses the entries in ascending key order with a fallible
    /// function, rebuilding the tree shape inside `Option`.
    ///
    /// Each node is reconstructed by lifting the node constructor over the
    /// effects of its left subtree, its own value, and its right subtree,
    /// so a successful traversal returns a tree of identical shape.
    pub fn traverse_with_key_option<W, F>(&self, mut transform: F) -> Option<RedBlackTree<K, W>>
    where
        F: FnMut(&K, &V) -> Option<W>,
    {
        Self::traverse_option_node(&self.root, &mut transform).map(|root| RedBlackTree {
            root: ReferenceCounter::new(root),
        })
    }

    fn traverse_option_node<W, F>(tree: &Link<K, V>, transform: &mut F) -> Option<Tree<K, W>>
    where
        F: FnMut(&K, &V) -> Option<W>,
    {
        match &**tree {
            Tree::Leaf => Some(Tree::Leaf),
            Tree::DoubleBlackLeaf => Some(Tree::DoubleBlackLeaf),
            Tree::Node {
                color,
                left,
                key,
                value,
                right,
            } => {
                let traversed_left = Self::traverse_option_node(left, transform);
                let transformed = transform(key, value);
                let traversed_right = Self::traverse_option_node(right, transform);
                traversed_left.map3(
                    transformed,
                    traversed_right,
                    |new_left, new_value, new_right| Tree::Node {
                        color: *color,
                        left: ReferenceCounter::new(new_left),
                        key: key.clone(),
                        value: new_value,
                        right: ReferenceCounter::new(new_right),
                    },
                )
            }
        }
    }

    /// Traverses the entries in ascending key order with a fallible
    /// function, rebuilding the tree shape inside `Result`.
    ///
    /// The error of the entry earliest in key order wins.
    ///
    /// # Errors
    ///
    /// Returns the first `Err` the function produces, in ascending key
    /// order.
    pub fn traverse_with_key_result<W, E, F>(
        &self,
        mut transform: F,
    ) -> Result<RedBlackTree<K, W>, E>
    where
        E: Clone,
        F: FnMut(&K, &V) -> Result<W, E>,
    {
        Self::traverse_result_node(&self.root, &mut transform).map(|root| RedBlackTree {
            root: ReferenceCounter::new(root),
        })
    }

    fn traverse_result_node<W, E, F>(tree: &Link<K, V>, transform: &mut F) -> Result<Tree<K, W>, E>
    where
        E: Clone,
        F: FnMut(&K, &V) -> Result<W, E>,
    {
        match &**tree {
            Tree::Leaf => Ok(Tree::Leaf),
            Tree::DoubleBlackLeaf => Ok(Tree::DoubleBlackLeaf),
            Tree::Node {
                color,
                left,
                key,
                value,
                right,
            } => {
                let traversed_left = Self::traverse_result_node(left, transform);
                let transformed = transform(key, value);
                let traversed_right = Self::traverse_result_node(right, transform);
                traversed_left.map3(
                    transformed,
                    traversed_right,
                    |new_left, new_value, new_right| Tree::Node {
                        color: *color,
                        left: ReferenceCounter::new(new_left),
                        key: key.clone(),
                        value: new_value,
                        right: ReferenceCounter::new(new_right),
                    },
                )
            }
        }
    }
}

// =============================================================================
// Parallel Operations
// =============================================================================

impl<K, V> RedBlackTree<K, V>
where
    K: Clone + Ord + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Applies a pure function to every value, splitting subtrees across
    /// worker threads when the tree is large enough.
    ///
    /// The result equals `map_with_key(transform)` for the same input; the
    /// comparison point is only the schedule. Small trees (or a budget of
    /// zero workers) fall back to a sequential walk.
    ///
    /// # Panics
    ///
    /// Panics if `transform` panics on a worker thread.
    #[must_use]
    pub fn par_map_with_key<W, F>(&self, transform: F) -> RedBlackTree<K, W>
    where
        W: Send + Sync,
        F: Fn(&K, &V) -> W + Sync,
    {
        if !parallel::meets_threshold(self.black_height()) {
            return RedBlackTree {
                root: ReferenceCounter::new(Self::map_local(&self.root, &transform)),
            };
        }
        let budget = parallel::worker_budget();
        RedBlackTree {
            root: ReferenceCounter::new(Self::par_map_node(&self.root, budget, &transform)),
        }
    }

    /// Sequential walk used below the split threshold; distinct from the
    /// `FnMut`-taking public variant so each call site stays monomorphic.
    fn map_local<W, F>(tree: &Link<K, V>, transform: &F) -> Tree<K, W>
    where
        F: Fn(&K, &V) -> W,
    {
        match &**tree {
            Tree::Leaf => Tree::Leaf,
            Tree::DoubleBlackLeaf => Tree::DoubleBlackLeaf,
            Tree::Node {
                color,
                left,
                key,
                value,
                right,
            } => Tree::Node {
                color: *color,
                left: ReferenceCounter::new(Self::map_local(left, transform)),
                key: key.clone(),
                value: transform(key, value),
                right: ReferenceCounter::new(Self::map_local(right, transform)),
            },
        }
    }

    fn par_map_node<W, F>(tree: &Link<K, V>, budget: usize, transform: &F) -> Tree<K, W>
    where
        W: Send + Sync,
        F: Fn(&K, &V) -> W + Sync,
    {
        match &**tree {
            Tree::Leaf => Tree::Leaf,
            Tree::DoubleBlackLeaf => Tree::DoubleBlackLeaf,
            Tree::Node {
                color,
                left,
                key,
                value,
                right,
            } => {
                if budget <= 1 {
                    return Self::map_local(tree, transform);
                }
                let child_budget = parallel::split_budget(budget);
                let (mapped_left, mapped_value, mapped_right) = thread::scope(|scope| {
                    let (left_sender, left_receiver) = mpsc::sync_channel(1);
                    scope.spawn(move || {
                        let _ = left_sender.send(Self::par_map_node(left, child_budget, transform));
                    });
                    let (right_sender, right_receiver) = mpsc::sync_channel(1);
                    scope.spawn(move || {
                        let _ =
                            right_sender.send(Self::par_map_node(right, child_budget, transform));
                    });
                    // Node-local work happens in the caller while the
                    // workers run.
                    let mapped_value = transform(key, value);
                    (
                        left_receiver.recv().expect("tree worker disconnected"),
                        mapped_value,
                        right_receiver.recv().expect("tree worker disconnected"),
                    )
                });
                Tree::Node {
                    color: *color,
                    left: ReferenceCounter::new(mapped_left),
                    key: key.clone(),
                    value: mapped_value,
                    right: ReferenceCounter::new(mapped_right),
                }
            }
        }
    }

    /// Counts the entries satisfying a pure predicate, in parallel when the
    /// tree is large enough.
    ///
    /// The result equals `count(predicate)` for the same input.
    ///
    /// # Panics
    ///
    /// Panics if `predicate` panics on a worker thread.
    #[must_use]
    pub fn par_count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K, &V) -> bool + Sync,
    {
        if !parallel::meets_threshold(self.black_height()) {
            return Self::count_local(&self.root, &predicate);
        }
        let budget = parallel::worker_budget();
        Self::par_count_node(&self.root, budget, &predicate)
    }

    fn count_local<F>(tree: &Link<K, V>, predicate: &F) -> usize
    where
        F: Fn(&K, &V) -> bool,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                Self::count_local(left, predicate)
                    + usize::from(predicate(key, value))
                    + Self::count_local(right, predicate)
            }
            _ => 0,
        }
    }

    fn par_count_node<F>(tree: &Link<K, V>, budget: usize, predicate: &F) -> usize
    where
        F: Fn(&K, &V) -> bool + Sync,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                if budget <= 1 {
                    return Self::count_local(tree, predicate);
                }
                let child_budget = parallel::split_budget(budget);
                thread::scope(|scope| {
                    let (left_sender, left_receiver) = mpsc::sync_channel(1);
                    scope.spawn(move || {
                        let _ =
                            left_sender.send(Self::par_count_node(left, child_budget, predicate));
                    });
                    let (right_sender, right_receiver) = mpsc::sync_channel(1);
                    scope.spawn(move || {
                        let _ =
                            right_sender.send(Self::par_count_node(right, child_budget, predicate));
                    });
                    let here = usize::from(predicate(key, value));
                    left_receiver.recv().expect("tree worker disconnected")
                        + here
                        + right_receiver.recv().expect("tree worker disconnected")
                })
            }
            _ => 0,
        }
    }

    /// Returns the entry minimizing a pure comparator, in parallel when the
    /// tree is large enough.
    ///
    /// Ties keep the entry that comes first in ascending key order, exactly
    /// as [`minimum_by`](Self::minimum_by) does.
    ///
    /// # Panics
    ///
    /// Panics if `compare` panics on a worker thread.
    #[must_use]
    pub fn par_minimum_by<F>(&self, compare: F) -> Option<(&K, &V)>
    where
        F: Fn(&K, &V, &K, &V) -> Ordering + Sync,
    {
        if !parallel::meets_threshold(self.black_height()) {
            return Self::minimum_by_local(&self.root, &compare);
        }
        let budget = parallel::worker_budget();
        Self::par_minimum_by_node(&self.root, budget, &compare)
    }

    fn minimum_by_local<'a, F>(tree: &'a Link<K, V>, compare: &F) -> Option<(&'a K, &'a V)>
    where
        F: Fn(&K, &V, &K, &V) -> Ordering,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                let best = Self::prefer_earlier_minimum(
                    Self::minimum_by_local(left, compare),
                    (key, value),
                    compare,
                );
                Some(match Self::minimum_by_local(right, compare) {
                    Some(candidate) => Self::prefer_earlier_minimum(Some(best), candidate, compare),
                    None => best,
                })
            }
            _ => None,
        }
    }

    fn par_minimum_by_node<'a, F>(
        tree: &'a Link<K, V>,
        budget: usize,
        compare: &F,
    ) -> Option<(&'a K, &'a V)>
    where
        F: Fn(&K, &V, &K, &V) -> Ordering + Sync,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                if budget == 0 {
                    return Self::minimum_by_local(tree, compare);
                }
                let child_budget = parallel::split_budget(budget);
                let (left_best, right_best) = thread::scope(|scope| {
                    let (left_sender, left_receiver) = mpsc::sync_channel(1);
                    scope.spawn(move || {
                        let _ = left_sender
                            .send(Self::par_minimum_by_node(left, child_budget, compare));
                    });
                    let (right_sender, right_receiver) = mpsc::sync_channel(1);
                    scope.spawn(move || {
                        let _ = right_sender
                            .send(Self::par_minimum_by_node(right, child_budget, compare));
                    });
                    (
                        left_receiver.recv().expect("tree worker disconnected"),
                        right_receiver.recv().expect("tree worker disconnected"),
                    )
                });
                // Combine in traversal order so ties resolve left-first.
                let best = Self::prefer_earlier_minimum(left_best, (key, value), compare);
                Some(match right_best {
                    Some(candidate) => Self::prefer_earlier_minimum(Some(best), candidate, compare),
                    None => best,
                })
            }
            _ => None,
        }
    }

    /// Keeps the earlier of an accumulated minimum and a later candidate,
    /// replacing only on a strictly greater comparison.
    fn prefer_earlier_minimum<'a, F>(
        accumulated: Option<(&'a K, &'a V)>,
        candidate: (&'a K, &'a V),
        compare: &F,
    ) -> (&'a K, &'a V)
    where
        F: Fn(&K, &V, &K, &V) -> Ordering,
    {
        match accumulated {
            Some((best_key, best_value))
                if compare(best_key, best_value, candidate.0, candidate.1) != Ordering::Greater =>
            {
                (best_key, best_value)
            }
            _ => candidate,
        }
    }

    /// Returns the entry maximizing a pure comparator, in parallel when the
    /// tree is large enough.
    ///
    /// Ties keep the entry that comes first in ascending key order, exactly
    /// as [`maximum_by`](Self::maximum_by) does.
    ///
    /// # Panics
    ///
    /// Panics if `compare` panics on a worker thread.
    #[must_use]
    pub fn par_maximum_by<F>(&self, compare: F) -> Option<(&K, &V)>
    where
        F: Fn(&K, &V, &K, &V) -> Ordering + Sync,
    {
        if !parallel::meets_threshold(self.black_height()) {
            return Self::maximum_by_local(&self.root, &compare);
        }
        let budget = parallel::worker_budget();
        Self::par_maximum_by_node(&self.root, budget, &compare)
    }

    fn maximum_by_local<'a, F>(tree: &'a Link<K, V>, compare: &F) -> Option<(&'a K, &'a V)>
    where
        F: Fn(&K, &V, &K, &V) -> Ordering,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                let best = Self::prefer_earlier_maximum(
                    Self::maximum_by_local(left, compare),
                    (key, value),
                    compare,
                );
                Some(match Self::maximum_by_local(right, compare) {
                    Some(candidate) => Self::prefer_earlier_maximum(Some(best), candidate, compare),
                    None => best,
                })
            }
            _ => None,
        }
    }

    fn par_maximum_by_node<'a, F>(
        tree: &'a Link<K, V>,
        budget: usize,
        compare: &F,
    ) -> Option<(&'a K, &'a V)>
    where
        F: Fn(&K, &V, &K, &V) -> Ordering + Sync,
    {
        match &**tree {
            Tree::Node {
                left,
                key,
                value,
                right,
                ..
            } => {
                if budget == 0 {
                    return Self::maximum_by_local(tree, compare);
                }
                let child_budget = parallel::split_budget(budget);
                let (left_best, right_best) = thread::scope(|scope| {
                    let (left_sender, left_receiver) = mpsc::sync_channel(1);
                    scope.spawn(move || {
                        let _ = left_sender
                            .send(Self::par_maximum_by_node(left, child_budget, compare));
                    });
                    let (right_sender, right_receiver) = mpsc::sync_channel(1);
                    scope.spawn(move || {
                        let _ = right_sender
                            .send(Self::par_maximum_by_node(right, child_budget, compare));
                    });
                    (
                        left_receiver.recv().expect("tree worker disconnected"),
                        right_receiver.recv().expect("tree worker disconnected"),
                    )
                });
                let best = Self::prefer_earlier_maximum(left_best, (key, value), compare);
                Some(match right_best {
                    Some(candidate) => Self::prefer_earlier_maximum(Some(best), candidate, compare),
                    None => best,
                })
            }
            _ => None,
        }
    }

    /// Keeps the earlier of an accumulated maximum and a later candidate,
    /// replacing only on a strictly lesser comparison.
    fn prefer_earlier_maximum<'a, F>(
        accumulated: Option<(&'a K, &'a V)>,
        candidate: (&'a K, &'a V),
        compare: &F,
    ) -> (&'a K, &'a V)
    where
        F: Fn(&K, &V, &K, &V) -> Ordering,
    {
        match accumulated {
            Some((best_key, best_value))
                if compare(best_key, best_value, candidate.0, candidate.1) != Ordering::Less =>
            {
                (best_key, best_value)
            }
            _ => candidate,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::collections::BTreeMap;

    /// Checks the search-order, no-red-red and uniform-black-height
    /// invariants, and that no double-black marker is visible.
    fn assert_valid<K: Ord, V>(tree: &RedBlackTree<K, V>) {
        fn walk<K: Ord, V>(tree: &Tree<K, V>, lower: Option<&K>, upper: Option<&K>) -> usize {
            match tree {
                Tree::Leaf => 1,
                Tree::DoubleBlackLeaf => panic!("double-black leaf in a public tree"),
                Tree::Node {
                    color,
                    left,
                    key,
                    right,
                    ..
                } => {
                    assert_ne!(*color, Color::DoubleBlack, "double-black node in a public tree");
                    if let Some(lower_bound) = lower {
                        assert!(key > lower_bound, "search order violated");
                    }
                    if let Some(upper_bound) = upper {
                        assert!(key < upper_bound, "search order violated");
                    }
                    if *color == Color::Red {
                        assert!(
                            !left.is_red() && !right.is_red(),
                            "red node with a red child"
                        );
                    }
                    let left_height = walk(left, lower, Some(key));
                    let right_height = walk(right, Some(key), upper);
                    assert_eq!(left_height, right_height, "black height differs");
                    left_height + usize::from(*color == Color::Black)
                }
            }
        }
        walk(&tree.root, None, None);
    }

    fn tree_of(keys: impl IntoIterator<Item = i32>) -> RedBlackTree<i32, ()> {
        keys.into_iter()
            .fold(RedBlackTree::new(), |tree, key| tree.insert(key, ()))
    }

    #[rstest]
    fn test_insert_and_iterate_in_order() {
        let tree = RedBlackTree::new()
            .insert(3, 'c')
            .insert(1, 'a')
            .insert(2, 'b');
        let pairs = tree.fold_left(Vec::new(), |mut pairs, key, value| {
            pairs.push((*key, *value));
            pairs
        });
        assert_eq!(pairs, vec![(1, 'a'), (2, 'b'), (3, 'c')]);
    }

    #[rstest]
    fn test_insert_overwrites_without_growing() {
        let tree = tree_of(0..10);
        let updated = tree.insert(5, ());
        assert_eq!(updated.size(), 10);
        assert_valid(&updated);
    }

    #[rstest]
    fn test_insert_keeps_invariants_ascending_and_descending() {
        let ascending = tree_of(0..100);
        assert_valid(&ascending);
        assert_eq!(ascending.size(), 100);

        let descending = tree_of((0..100).rev());
        assert_valid(&descending);
        assert_eq!(descending.size(), 100);
    }

    #[rstest]
    fn test_remove_middle_of_range() {
        let tree = tree_of(0..100);
        let removed = tree.remove(&50);
        assert!(!removed.contains_key(&50));
        assert_eq!(removed.size(), 99);
        assert_valid(&removed);
    }

    #[rstest]
    fn test_remove_every_key_in_order_yields_empty() {
        let mut tree = tree_of(0..20);
        for key in 0..20 {
            tree = tree.remove(&key);
            assert_valid(&tree);
        }
        assert!(tree.is_empty());
        assert_eq!(tree.size(), 0);
    }

    #[rstest]
    fn test_remove_every_key_in_reverse_yields_empty() {
        let mut tree = tree_of(0..20);
        for key in (0..20).rev() {
            tree = tree.remove(&key);
            assert_valid(&tree);
        }
        assert!(tree.is_empty());
    }

    #[rstest]
    fn test_remove_absent_key_shares_root() {
        let tree = tree_of(0..10);
        let same = tree.remove(&99);
        assert!(ReferenceCounter::ptr_eq(&tree.root, &same.root));
    }

    #[rstest]
    fn test_remove_from_singleton() {
        let tree = RedBlackTree::new().insert(1, "one");
        let empty = tree.remove(&1);
        assert!(empty.is_empty());
        assert_valid(&empty);
    }

    #[rstest]
    fn test_get_after_insert_and_remove() {
        let tree = RedBlackTree::new().insert(1, 10).insert(2, 20).insert(3, 30);
        assert_eq!(tree.get(&2), Some(&20));
        assert_eq!(tree.remove(&2).get(&2), None);
        assert_eq!(tree.remove(&2).get(&1), Some(&10));
    }

    #[rstest]
    fn test_insert_with_combines_on_collision() {
        let tree = RedBlackTree::new().insert(1, 10);
        let summed = tree.insert_with(|_, new, old| new + old, 1, 5);
        assert_eq!(summed.get(&1), Some(&15));

        let fresh = tree.insert_with(|_, new, old| new + old, 2, 7);
        assert_eq!(fresh.get(&2), Some(&7));
    }

    #[rstest]
    fn test_update_with_none_shares_root() {
        let tree = tree_of(0..10);
        let unchanged = tree.update_with(|_, ()| None, &5);
        assert!(ReferenceCounter::ptr_eq(&tree.root, &unchanged.root));

        let absent = tree.update_with(|_, ()| Some(()), &42);
        assert!(ReferenceCounter::ptr_eq(&tree.root, &absent.root));
    }

    #[rstest]
    fn test_update_with_replaces_in_place() {
        let tree = RedBlackTree::new().insert(1, 10).insert(2, 20);
        let updated = tree.update_with(|_, value| Some(value + 1), &2);
        assert_eq!(updated.get(&2), Some(&21));
        assert_eq!(updated.size(), 2);
    }

    #[rstest]
    fn test_minimum_and_maximum() {
        let tree = tree_of([5, 3, 9, 1, 7]);
        assert_eq!(tree.minimum(), Some((&1, &())));
        assert_eq!(tree.maximum(), Some((&9, &())));
        assert_eq!(RedBlackTree::<i32, ()>::new().minimum(), None);
    }

    #[rstest]
    fn test_black_height_grows_logarithmically() {
        let tree = tree_of(0..1000);
        let height = tree.black_height();
        assert!(height >= 5 && height <= 10, "height was {height}");
    }

    #[rstest]
    fn test_fold_right_reverses_fold_left() {
        let tree = tree_of(0..10);
        let ascending = tree.fold_left(Vec::new(), |mut keys, key, ()| {
            keys.push(*key);
            keys
        });
        let mut descending = tree.fold_right(Vec::new(), |key, (), mut keys| {
            keys.push(*key);
            keys
        });
        descending.reverse();
        assert_eq!(ascending, descending);
    }

    #[rstest]
    fn test_reduce_left_and_right() {
        let tree = RedBlackTree::new().insert(1, 1).insert(2, 2).insert(3, 3);
        let summed = tree.reduce_left(|(k1, v1), (k2, v2)| (k1.max(k2), v1 + v2));
        assert_eq!(summed, Some((3, 6)));

        let empty: RedBlackTree<i32, i32> = RedBlackTree::new();
        assert_eq!(empty.reduce_left(|pair, _| pair), None);
        assert_eq!(empty.reduce_right(|pair, _| pair), None);
    }

    #[rstest]
    fn test_find_left_and_right() {
        let tree = tree_of(0..10);
        assert_eq!(tree.find_left(|key, ()| key % 3 == 0), Some((&0, &())));
        assert_eq!(tree.find_right(|key, ()| key % 3 == 0), Some((&9, &())));
        assert_eq!(tree.find_left(|key, ()| *key > 99), None);
    }

    #[rstest]
    fn test_exists_for_all_count() {
        let tree = tree_of(0..10);
        assert!(tree.exists(|key, ()| *key == 7));
        assert!(tree.for_all(|key, ()| *key < 10));
        assert!(!tree.for_all(|key, ()| *key < 9));
        assert_eq!(tree.count(|key, ()| key % 2 == 0), 5);
    }

    #[rstest]
    fn test_map_with_key_preserves_shape() {
        let tree = tree_of(0..50);
        let mapped = tree.map_with_key(|key, ()| key * 2);
        assert_eq!(mapped.size(), 50);
        assert_eq!(mapped.black_height(), tree.black_height());
        assert_eq!(mapped.get(&21), Some(&42));
        assert_valid(&mapped);
    }

    #[rstest]
    fn test_query_prunes_to_range() {
        let tree = tree_of(0..100);
        let range: Vec<i32> = tree
            .query(|key| {
                if *key < 10 {
                    Ordering::Less
                } else if *key > 15 {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            })
            .into_iter()
            .map(|(key, ())| *key)
            .collect();
        assert_eq!(range, (10..=15).collect::<Vec<_>>());
    }

    #[rstest]
    fn test_minimum_by_breaks_ties_left_first() {
        let tree = RedBlackTree::new()
            .insert(1, 5)
            .insert(2, 5)
            .insert(3, 5)
            .insert(4, 9);
        let by_value = tree.minimum_by(|_, v1, _, v2| v1.cmp(v2));
        assert_eq!(by_value, Some((&1, &5)));

        let by_value_max = tree.maximum_by(|_, v1, _, v2| v1.cmp(v2));
        assert_eq!(by_value_max, Some((&4, &9)));
    }

    proptest! {
        /// Random edit scripts preserve every invariant and agree with a
        /// model map.
        #[test]
        fn prop_edit_scripts_match_model(
            script in prop::collection::vec((any::<bool>(), 0i32..64), 0..60)
        ) {
            let mut tree: RedBlackTree<i32, i32> = RedBlackTree::new();
            let mut model: BTreeMap<i32, i32> = BTreeMap::new();

            for (index, (is_insert, key)) in script.into_iter().enumerate() {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let stamp = index as i32;
                if is_insert {
                    tree = tree.insert(key, stamp);
                    model.insert(key, stamp);
                } else {
                    tree = tree.remove(&key);
                    model.remove(&key);
                }
                assert_valid(&tree);
            }

            prop_assert_eq!(tree.size(), model.len());
            for (key, value) in &model {
                prop_assert_eq!(tree.get(key), Some(value));
            }
        }

        /// The size law: inserting grows the tree only for absent keys.
        #[test]
        fn prop_insert_size_law(keys in prop::collection::vec(0i32..32, 0..40), extra in 0i32..32) {
            let tree = keys.iter().fold(RedBlackTree::new(), |tree, key| tree.insert(*key, ()));
            let expected = tree.size() + usize::from(!tree.contains_key(&extra));
            prop_assert_eq!(tree.insert(extra, ()).size(), expected);
        }
    }
}

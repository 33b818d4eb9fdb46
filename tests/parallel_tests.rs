//! Tests for the parallel tree walks.
//!
//! The contract under test is semantic: every parallel operation returns
//! exactly what its sequential counterpart returns, for trees on both sides
//! of the dispatch threshold.

use evergreen::persistent::{DelayMap, RedBlackTree, TreeMap};
use rstest::rstest;
use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

fn tree_of(count: i32) -> RedBlackTree<i32, i32> {
    (0..count).fold(RedBlackTree::new(), |tree, key| tree.insert(key, key * 3))
}

// =============================================================================
// Map Equivalence
// =============================================================================

#[rstest]
#[case::small(100)]
#[case::large(10_000)]
fn test_par_map_with_key_equals_sequential(#[case] count: i32) {
    let tree = tree_of(count);
    let sequential = tree.map_with_key(|key, value| key + value);
    let parallel = tree.par_map_with_key(|key, value| key + value);

    assert_eq!(parallel.size(), sequential.size());
    for key in 0..count {
        assert_eq!(parallel.get(&key), sequential.get(&key));
    }
}

#[rstest]
fn test_par_map_preserves_shape() {
    let tree = tree_of(5_000);
    let mapped = tree.par_map_with_key(|_, value| value * 2);
    assert_eq!(mapped.black_height(), tree.black_height());
    assert_eq!(mapped.size(), tree.size());
}

#[rstest]
fn test_par_map_applies_function_once_per_entry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let tree = tree_of(4_096);

    let counter = Arc::clone(&calls);
    let _mapped = tree.par_map_with_key(move |_, value| {
        counter.fetch_add(1, AtomicOrdering::SeqCst);
        *value
    });
    assert_eq!(calls.load(AtomicOrdering::SeqCst), 4_096);
}

// =============================================================================
// Count Equivalence
// =============================================================================

#[rstest]
#[case::small(64)]
#[case::large(10_000)]
fn test_par_count_equals_sequential(#[case] count: i32) {
    let tree = tree_of(count);
    let sequential = tree.count(|key, _| key % 7 == 0);
    let parallel = tree.par_count(|key, _| key % 7 == 0);
    assert_eq!(parallel, sequential);
}

// =============================================================================
// Extremum Equivalence and Tie-Breaking
// =============================================================================

#[rstest]
#[case::small(64)]
#[case::large(10_000)]
fn test_par_minimum_by_equals_sequential(#[case] count: i32) {
    let tree = tree_of(count);
    // Compare by value modulo 97 so the minimum is somewhere interior.
    let comparator =
        |_: &i32, left: &i32, _: &i32, right: &i32| (left % 97).cmp(&(right % 97));
    assert_eq!(tree.par_minimum_by(comparator), tree.minimum_by(comparator));
    assert_eq!(tree.par_maximum_by(comparator), tree.maximum_by(comparator));
}

#[rstest]
fn test_ties_resolve_to_first_in_key_order() {
    // All values equal: every entry ties, so the first key must win.
    let tree: RedBlackTree<i32, i32> =
        (0..5_000).fold(RedBlackTree::new(), |tree, key| tree.insert(key, 1));

    let compare = |_: &i32, left: &i32, _: &i32, right: &i32| left.cmp(right);
    assert_eq!(tree.par_minimum_by(compare), Some((&0, &1)));
    assert_eq!(tree.par_maximum_by(compare), Some((&0, &1)));
    assert_eq!(tree.minimum_by(compare), Some((&0, &1)));
    assert_eq!(tree.maximum_by(compare), Some((&0, &1)));
}

#[rstest]
fn test_par_operations_on_empty_tree() {
    let tree: RedBlackTree<i32, i32> = RedBlackTree::new();
    assert_eq!(tree.par_count(|_, _| true), 0);
    assert_eq!(tree.par_minimum_by(|_, a, _, b| a.cmp(b)), None);
    assert!(tree.par_map_with_key(|_, value| *value).is_empty());
}

// =============================================================================
// Map-Level Dispatch
// =============================================================================

#[rstest]
fn test_tree_map_parallel_surface() {
    let map: TreeMap<i32, i32> = (0..10_000).map(|key| (key, key % 13)).collect();

    assert_eq!(
        map.par_count(|_, value| *value == 0),
        map.count(|_, value| *value == 0)
    );

    let by_value = map.minimum_value_by(|left, right| left.cmp(right));
    assert_eq!(by_value, Some((&0, &0)));

    let by_value_max = map.maximum_value_by(|left, right| left.cmp(right));
    assert_eq!(by_value_max, Some((&12, &12)));

    let doubled = map.par_map_with_key(|_, value| value * 2);
    assert_eq!(doubled.get(&9_999), Some(&((9_999 % 13) * 2)));
}

#[rstest]
fn test_delay_map_parallel_to_map() {
    let lazy: DelayMap<i32, i32> = (0..10_000).fold(DelayMap::new(), |map, key| {
        map.insert_lazy(key, move || key * 2)
    });

    let forced = lazy.to_map();
    let expected: TreeMap<i32, i32> = (0..10_000).map(|key| (key, key * 2)).collect();
    assert_eq!(forced, expected);
}

// =============================================================================
// Comparator Determinism
// =============================================================================

#[rstest]
fn test_par_minimum_by_with_ordering_enum() {
    let tree: RedBlackTree<i32, i32> = (0..2_048)
        .fold(RedBlackTree::new(), |tree, key| {
            tree.insert(key, if key == 1_234 { -1 } else { key })
        });

    let compare = |_: &i32, left: &i32, _: &i32, right: &i32| -> Ordering { left.cmp(right) };
    assert_eq!(tree.par_minimum_by(compare), Some((&1_234, &-1)));
}

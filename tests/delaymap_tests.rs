//! Unit tests for `DelayMap`.
//!
//! The interesting properties are observational: which suspensions run,
//! when, and how many times. Call counters shared with the suspensions
//! make that visible.

use evergreen::persistent::{DelayMap, TreeMap};
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn lazy_range(runs: &Arc<AtomicUsize>, range: std::ops::Range<i32>) -> DelayMap<i32, i32> {
    range.fold(DelayMap::new(), |map, key| {
        let runs = Arc::clone(runs);
        map.insert_lazy(key, move || {
            runs.fetch_add(1, Ordering::SeqCst);
            key * 100
        })
    })
}

// =============================================================================
// Forcing Discipline
// =============================================================================

#[rstest]
fn test_nothing_runs_until_read() {
    let runs = counter();
    let map = lazy_range(&runs, 0..10);

    assert_eq!(map.size(), 10);
    assert_eq!(map.keys().len(), 10);
    assert!(map.contains_key(&7));
    assert!(!map.is_empty());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[rstest]
fn test_get_forces_exactly_one_entry_once() {
    let runs = counter();
    let map = lazy_range(&runs, 0..10);

    assert_eq!(map.get(&4), Some(&400));
    assert_eq!(map.get(&4), Some(&400));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[rstest]
fn test_minimum_and_maximum_force_only_their_entry() {
    let runs = counter();
    let map = lazy_range(&runs, 0..10);

    assert_eq!(map.minimum(), Some((&0, &0)));
    assert_eq!(map.maximum(), Some((&9, &900)));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[rstest]
fn test_forcing_is_shared_across_versions() {
    let runs = counter();
    let map = lazy_range(&runs, 0..4);
    let extended = map.insert(99, -1);

    // Forcing through the derived version memoizes for the original.
    assert_eq!(extended.get(&2), Some(&200));
    assert_eq!(map.get(&2), Some(&200));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[rstest]
fn test_remove_never_forces() {
    let runs = counter();
    let map = lazy_range(&runs, 0..10);
    let removed = map.remove(&3);

    assert_eq!(removed.size(), 9);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Lazy and Eager Combinator Pairs
// =============================================================================

#[rstest]
fn test_insert_with_lazy_defers_combination() {
    let runs = counter();
    let observed = Arc::clone(&runs);
    let map = lazy_range(&runs, 0..4).insert_with_lazy(
        move |_, new_value, old_value| {
            observed.fetch_add(1, Ordering::SeqCst);
            new_value + old_value
        },
        2,
        7,
    );

    // Neither the old suspension nor the combiner has run.
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    // Forcing the entry runs the old suspension and the combiner.
    assert_eq!(map.get(&2), Some(&207));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[rstest]
fn test_insert_with_lazy_without_collision_stays_eager_value() {
    let runs = counter();
    let map = lazy_range(&runs, 0..4).insert_with_lazy(|_, new_value, old_value| new_value + old_value, 50, 7);

    assert_eq!(map.get(&50), Some(&7));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[rstest]
fn test_insert_with_eager_runs_now() {
    let runs = counter();
    let map = lazy_range(&runs, 0..4);

    let combined = map.insert_with_eager(|_, new_value, old_value| new_value + old_value, 2, 7);
    // The collision forced the old entry during the call.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(combined.get(&2), Some(&207));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[rstest]
fn test_update_with_eager_and_lazy() {
    let runs = counter();
    let map = lazy_range(&runs, 0..4);

    let eager = map.update_with_eager(|_, value| Some(value + 1), &1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(eager.get(&1), Some(&101));

    let runs_lazy = counter();
    let lazy_map = lazy_range(&runs_lazy, 0..4).update_with_lazy(|_, value| Some(value + 1), &1);
    assert_eq!(runs_lazy.load(Ordering::SeqCst), 0);
    assert_eq!(lazy_map.get(&1), Some(&101));
    assert_eq!(runs_lazy.load(Ordering::SeqCst), 1);
}

#[rstest]
fn test_map_with_key_lazy_composes_without_forcing() {
    let runs = counter();
    let map = lazy_range(&runs, 0..6);

    let shifted = map.map_with_key_lazy(|key, value| key + value);
    let doubled = shifted.map_with_key_lazy(|_, value| value * 2);
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    assert_eq!(doubled.get(&3), Some(&606));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[rstest]
fn test_map_with_key_eager_forces_all_in_key_order() {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let map: DelayMap<i32, i32> = (0..5).map(|key| (key, key)).collect();

    let log = Arc::clone(&order);
    let _mapped = map.map_with_key_eager(move |key, value| {
        log.lock().unwrap().push(*key);
        value + 1
    });
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

// =============================================================================
// Conversions
// =============================================================================

#[rstest]
fn test_to_map_equals_eager_construction() {
    let runs = counter();
    let map = lazy_range(&runs, 0..10);
    let forced: TreeMap<i32, i32> = map.to_map();

    let expected: TreeMap<i32, i32> = (0..10).map(|key| (key, key * 100)).collect();
    assert_eq!(forced, expected);
    assert_eq!(runs.load(Ordering::SeqCst), 10);

    // A second conversion reuses every memoized value.
    let again = map.to_map();
    assert_eq!(again, expected);
    assert_eq!(runs.load(Ordering::SeqCst), 10);
}

#[rstest]
fn test_from_tree_map_round_trips() {
    let eager: TreeMap<i32, String> = (0..8).map(|key| (key, key.to_string())).collect();
    let delayed = DelayMap::from(eager.clone());
    assert_eq!(delayed.to_map(), eager);
}

#[rstest]
fn test_to_list_and_folds_force_in_order() {
    let runs = counter();
    let map = lazy_range(&runs, 0..5);

    assert_eq!(
        map.to_list(),
        vec![(0, 0), (1, 100), (2, 200), (3, 300), (4, 400)]
    );
    assert_eq!(runs.load(Ordering::SeqCst), 5);

    let keys_in_order = map.fold_left(Vec::new(), |mut keys, key, _| {
        keys.push(*key);
        keys
    });
    assert_eq!(keys_in_order, vec![0, 1, 2, 3, 4]);
}

#[rstest]
fn test_get_with_default() {
    let map: DelayMap<i32, i32> = DelayMap::new().insert(1, 10);
    assert_eq!(map.get_with_default(&1, 0), 10);
    assert_eq!(map.get_with_default(&2, 0), 0);
}

// =============================================================================
// Equality and Formatting
// =============================================================================

#[rstest]
fn test_equality_forces_and_compares_values() {
    let lazy: DelayMap<i32, i32> = (0..5).fold(DelayMap::new(), |map, key| {
        map.insert_lazy(key, move || key * 2)
    });
    let eager: DelayMap<i32, i32> = (0..5).map(|key| (key, key * 2)).collect();

    assert_eq!(lazy, eager);
    assert_ne!(lazy, eager.insert(0, -1));
}

#[rstest]
fn test_debug_marks_unforced_entries() {
    let map = DelayMap::new()
        .insert_lazy(1, || 10)
        .insert(2, 20);

    let rendered = format!("{map:?}");
    assert!(rendered.contains("<lazy>"));
    assert!(rendered.contains("20"));

    let _ = map.get(&1);
    let after = format!("{map:?}");
    assert!(after.contains("10"));
}

//! Unit tests for `Deque`.

use evergreen::mutable::Deque;
use rstest::rstest;

/// Checks the structural invariants after an operation: power-of-two
/// capacity with the fixed floor, and the load-factor window except at the
/// floor.
fn assert_invariants<T>(deque: &Deque<T>) {
    let capacity = deque.capacity();
    assert!(capacity.is_power_of_two());
    assert!(capacity >= Deque::<T>::MIN_CAPACITY);

    #[allow(clippy::cast_precision_loss)]
    let load_factor = deque.len() as f64 / capacity as f64;
    assert!(load_factor <= Deque::<T>::MAX_LOAD_FACTOR);
    if capacity > Deque::<T>::MIN_CAPACITY {
        assert!(load_factor >= Deque::<T>::MIN_LOAD_FACTOR);
    }
}

// =============================================================================
// Ordering Semantics
// =============================================================================

#[rstest]
fn test_same_end_is_lifo() {
    let mut deque = Deque::new();
    for value in 0..10 {
        deque.push_back(value);
    }
    for expected in (0..10).rev() {
        assert_eq!(deque.pop_back(), Some(expected));
    }
    assert_eq!(deque.pop_back(), None);
}

#[rstest]
fn test_opposite_end_is_fifo() {
    let mut deque = Deque::new();
    for value in 0..10 {
        deque.push_back(value);
    }
    for expected in 0..10 {
        assert_eq!(deque.pop_front(), Some(expected));
    }
    assert_eq!(deque.pop_front(), None);
}

#[rstest]
fn test_front_pushes_then_back_pops() {
    let mut deque = Deque::new();
    for value in 0..10 {
        deque.push_front(value);
    }
    for expected in 0..10 {
        assert_eq!(deque.pop_back(), Some(expected));
    }
}

#[rstest]
fn test_mixed_sequence_matches_logical_order() {
    let mut deque = Deque::new();
    deque.push_front(1);
    deque.push_front(2);
    deque.push_front(3);
    deque.push_back(4);
    deque.push_back(5);

    assert_eq!(deque.to_list(), vec![3, 2, 1, 4, 5]);
    assert_eq!(deque.front(), Some(&3));
    assert_eq!(deque.back(), Some(&5));

    assert_eq!(deque.pop_back(), Some(5));
    assert_eq!(deque.pop_back(), Some(4));
    assert_eq!(deque.pop_back(), Some(1));
    assert_eq!(deque.pop_back(), Some(2));
    assert_eq!(deque.pop_back(), Some(3));
    assert_eq!(deque.pop_back(), None);
}

// =============================================================================
// Resize Behavior
// =============================================================================

#[rstest]
fn test_growth_sequence_8_16_32() {
    let mut deque = Deque::new();
    let mut capacities = vec![deque.capacity()];

    for value in 1..=20 {
        deque.push_back(value);
        if deque.capacity() != *capacities.last().unwrap() {
            capacities.push(deque.capacity());
        }
        assert_invariants(&deque);
    }

    assert_eq!(capacities, vec![8, 16, 32]);
    assert_eq!(deque.len(), 20);
}

#[rstest]
fn test_shrink_returns_to_minimum_but_never_below() {
    let mut deque: Deque<i32> = (1..=20).collect();

    for expected in 1..=20 {
        assert_eq!(deque.pop_front(), Some(expected));
        assert_invariants(&deque);
    }

    assert_eq!(deque.capacity(), Deque::<i32>::MIN_CAPACITY);
    assert!(deque.is_empty());
}

#[rstest]
fn test_invariants_hold_through_alternating_ends() {
    let mut deque = Deque::new();
    for round in 0..200 {
        if round % 3 == 0 {
            deque.push_front(round);
        } else {
            deque.push_back(round);
        }
        assert_invariants(&deque);
    }
    for _ in 0..150 {
        let _ = deque.pop_back();
        assert_invariants(&deque);
    }
    assert_eq!(deque.len(), 50);
}

// =============================================================================
// Aggregation
// =============================================================================

#[rstest]
fn test_sums_products_joins() {
    let deque: Deque<i32> = (1..=4).collect();
    assert_eq!(deque.sum(), 10);
    assert_eq!(deque.product(), 24);
    assert_eq!(deque.sum_with(|item| i64::from(*item)), 10);
    assert_eq!(deque.product_with(|item| i64::from(*item)), 24);
    assert_eq!(deque.join("+"), "1+2+3+4");
}

#[rstest]
fn test_fold_left_and_right() {
    let deque: Deque<char> = "abcd".chars().collect();
    let forward = deque.fold_left(String::new(), |mut text, item| {
        text.push(*item);
        text
    });
    let backward = deque.fold_right(String::new(), |item, mut text| {
        text.insert(0, *item);
        text
    });
    assert_eq!(forward, "abcd");
    assert_eq!(backward, "abcd");
}

#[rstest]
fn test_same_elements_is_structural() {
    let mut left = Deque::new();
    left.push_back(2);
    left.push_front(1);

    let right: Deque<i32> = (1..=2).collect();
    assert!(left.same_elements(&right));

    let mut shifted = right.clone();
    let _ = shifted.pop_front();
    assert!(!left.same_elements(&shifted));
}

#[rstest]
fn test_into_iterator_drains_front_to_back() {
    let deque: Deque<i32> = (0..6).collect();
    let drained: Vec<i32> = deque.into_iter().collect();
    assert_eq!(drained, vec![0, 1, 2, 3, 4, 5]);
}

#[rstest]
fn test_extend_appends_at_back() {
    let mut deque: Deque<i32> = (0..3).collect();
    deque.extend(3..6);
    assert_eq!(deque.to_list(), vec![0, 1, 2, 3, 4, 5]);
}

#![allow(unsafe_code)]
//! Thread-safe memoizing suspensions.
//!
//! This module provides the [`Thunk`] type: a suspended computation that
//! evaluates at most once and caches its value. Unlike a plain lazy cell, a
//! `Thunk` is cheaply cloneable, and every clone shares the same cell, so a
//! value memoized through one handle is visible through all of them. This is
//! what lets persistent maps share suspended entries across versions.
//!
//! # Safety
//!
//! This module uses unsafe code to implement a lock-free state machine.
//! The following invariants are maintained:
//! - `value` is only initialized when `state` is `STATE_READY`
//! - `producer` is `Some` only when `state` is `STATE_EMPTY`
//! - Transition to `STATE_COMPUTING` is done via `compare_exchange` for
//!   exclusivity
//! - Threads that observe `STATE_COMPUTING` wait with a short adaptive spin
//!   followed by a `parking_lot::Condvar` block
//!
//! # Poisoning
//!
//! If the suspension panics, the thunk becomes **poisoned**: `force` panics
//! on every subsequent call and [`Thunk::try_force`] reports
//! [`ThunkPoisonedError`]. Returning partial state after a panic would break
//! memoization, so the poisoned state is permanent.
//!
//! # Re-entrancy
//!
//! Forcing a thunk from within its own suspension deadlocks. Suspensions
//! must not force the thunk they initialize.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Condvar, Mutex};

/// State: not yet evaluated
const STATE_EMPTY: u8 = 0;
/// State: evaluation in progress
const STATE_COMPUTING: u8 = 1;
/// State: evaluation complete
const STATE_READY: u8 = 2;
/// State: suspension panicked
const STATE_POISONED: u8 = 3;

/// Spin iterations before falling back to the condvar wait.
const ADAPTIVE_SPIN_LIMIT: u32 = 64;

/// The suspended computation, type-erased so that every `Thunk<V>` has the
/// same concrete type regardless of which closure produced it.
type Producer<V> = Box<dyn FnOnce() -> V + Send>;

/// Condvar + Mutex pair for the blocking wait during evaluation (cold path).
struct WaitSync {
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl WaitSync {
    const fn new() -> Self {
        Self {
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }
}

/// Error returned when accessing a poisoned [`Thunk`].
///
/// A thunk becomes poisoned when its suspension panics. Once poisoned it can
/// never produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThunkPoisonedError;

impl fmt::Display for ThunkPoisonedError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Thunk suspension panicked; value is unavailable")
    }
}

impl std::error::Error for ThunkPoisonedError {}

/// Shared interior of a [`Thunk`].
struct ThunkCell<V> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<V>>,
    producer: UnsafeCell<Option<Producer<V>>>,
    wait_sync: WaitSync,
}

// # Safety
//
// - V: Send: the value may be produced on one thread and dropped on another
// - V: Sync: force() hands out &V to any thread holding a clone
// - The producer is already constrained to Send by the Producer alias
// - The atomic state machine guarantees exactly-once evaluation, and
//   STATE_READY loads/stores use Acquire/Release to publish the write
unsafe impl<V: Send + Sync> Send for ThunkCell<V> {}
unsafe impl<V: Send + Sync> Sync for ThunkCell<V> {}

impl<V> Drop for ThunkCell<V> {
    fn drop(&mut self) {
        if *self.state.get_mut() == STATE_READY {
            // SAFETY: value is initialized exactly when state is STATE_READY.
            unsafe {
                self.value.get_mut().assume_init_drop();
            }
        }
    }
}

/// A memoizing suspension.
///
/// `Thunk<V>` defers a computation until the value is first accessed via
/// [`force`](Self::force). Once computed, the value is cached; subsequent
/// forces return the cached value without recomputation, including forces
/// through other clones of the same thunk.
///
/// # Thread Safety
///
/// `Thunk<V>` is `Send + Sync` when `V: Send + Sync`. Multiple threads may
/// force the same thunk concurrently; the suspension runs exactly once and
/// the other threads wait for its result.
///
/// # Examples
///
/// ```rust
/// use evergreen::control::Thunk;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&runs);
/// let thunk = Thunk::defer(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
///     "computed".to_string()
/// });
///
/// let clone = thunk.clone();
/// assert_eq!(thunk.force(), "computed");
/// assert_eq!(clone.force(), "computed");
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// ```
pub struct Thunk<V> {
    cell: Arc<ThunkCell<V>>,
}

impl<V> Clone for Thunk<V> {
    /// Returns a handle to the same cell; memoization is shared.
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<V> Thunk<V> {
    /// Creates a thunk that will run `suspension` on first force.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evergreen::control::Thunk;
    ///
    /// let thunk = Thunk::defer(|| 40 + 2);
    /// assert_eq!(*thunk.force(), 42);
    /// ```
    #[must_use]
    pub fn defer<F>(suspension: F) -> Self
    where
        F: FnOnce() -> V + Send + 'static,
    {
        Self {
            cell: Arc::new(ThunkCell {
                state: AtomicU8::new(STATE_EMPTY),
                value: UnsafeCell::new(MaybeUninit::uninit()),
                producer: UnsafeCell::new(Some(Box::new(suspension))),
                wait_sync: WaitSync::new(),
            }),
        }
    }

    /// Creates an already-evaluated thunk.
    ///
    /// Forcing it returns the stored value immediately. This is how eager
    /// combinators store the results they have already computed.
    #[must_use]
    pub fn ready(value: V) -> Self {
        Self {
            cell: Arc::new(ThunkCell {
                state: AtomicU8::new(STATE_READY),
                value: UnsafeCell::new(MaybeUninit::new(value)),
                producer: UnsafeCell::new(None),
                wait_sync: WaitSync::new(),
            }),
        }
    }

    /// Forces evaluation and returns a reference to the value.
    ///
    /// The first force runs the suspension; every later force (through any
    /// clone) returns the cached value.
    ///
    /// # Panics
    ///
    /// Panics if the suspension panics, and on every force after that (the
    /// thunk is then poisoned). Use [`try_force`](Self::try_force) for a
    /// non-panicking variant.
    #[inline]
    pub fn force(&self) -> &V {
        let state = self.cell.state.load(Ordering::Acquire);
        if state == STATE_READY {
            // SAFETY: the transition to STATE_READY happens after the value
            // write, with Release ordering; the Acquire load above makes the
            // write visible here.
            return unsafe { (*self.cell.value.get()).assume_init_ref() };
        }
        match self.force_slow(state) {
            Ok(value) => value,
            Err(ThunkPoisonedError) => panic!("Thunk: suspension panicked"),
        }
    }

    /// Forces evaluation, reporting poisoning as an error instead of
    /// panicking.
    ///
    /// # Errors
    ///
    /// Returns [`ThunkPoisonedError`] if the suspension panicked, now or on
    /// an earlier force.
    pub fn try_force(&self) -> Result<&V, ThunkPoisonedError> {
        let state = self.cell.state.load(Ordering::Acquire);
        if state == STATE_READY {
            // SAFETY: same as force().
            return Ok(unsafe { (*self.cell.value.get()).assume_init_ref() });
        }
        self.force_slow(state)
    }

    /// Returns the value if it has already been evaluated, without forcing.
    #[must_use]
    pub fn try_get(&self) -> Option<&V> {
        if self.cell.state.load(Ordering::Acquire) == STATE_READY {
            // SAFETY: same as force().
            Some(unsafe { (*self.cell.value.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Returns `true` if the suspension has run to completion.
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.cell.state.load(Ordering::Acquire) == STATE_READY
    }

    /// Returns `true` if the suspension panicked.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.cell.state.load(Ordering::Acquire) == STATE_POISONED
    }

    /// Slow path: handles `STATE_EMPTY`, `STATE_COMPUTING` and
    /// `STATE_POISONED`. Kept out of line so the fast path in `force` stays
    /// small enough to inline.
    #[inline(never)]
    fn force_slow(&self, mut state: u8) -> Result<&V, ThunkPoisonedError> {
        loop {
            match state {
                STATE_READY => {
                    // SAFETY: same as force().
                    return Ok(unsafe { (*self.cell.value.get()).assume_init_ref() });
                }
                STATE_POISONED => return Err(ThunkPoisonedError),
                STATE_EMPTY => {
                    match self.cell.state.compare_exchange_weak(
                        STATE_EMPTY,
                        STATE_COMPUTING,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return self.evaluate(),
                        Err(current_state) => state = current_state,
                    }
                }
                STATE_COMPUTING => {
                    self.wait_for_evaluation();
                    state = self.cell.state.load(Ordering::Acquire);
                }
                _ => unreachable!("invalid thunk state"),
            }
        }
    }

    /// Runs the suspension. Must only be called by the thread that won the
    /// `STATE_EMPTY` → `STATE_COMPUTING` transition.
    fn evaluate(&self) -> Result<&V, ThunkPoisonedError> {
        // SAFETY: the compare_exchange succeeded, so this thread has
        // exclusive access; producer is Some exactly when state was
        // STATE_EMPTY.
        let producer = unsafe { (*self.cell.producer.get()).take() }
            .expect("Thunk: suspension already consumed");

        let outcome = catch_unwind(AssertUnwindSafe(producer));

        let next_state = match &outcome {
            Ok(_) => STATE_READY,
            Err(_) => STATE_POISONED,
        };
        if let Ok(value) = outcome {
            // SAFETY: only the computing thread reaches here; the slot is
            // uninitialized.
            unsafe {
                (*self.cell.value.get()).write(value);
            }
        }
        self.cell.state.store(next_state, Ordering::Release);

        // Taking and releasing the mutex orders this store before any
        // waiter's condvar sleep, so the notification cannot be lost.
        drop(self.cell.wait_sync.mutex.lock());
        self.cell.wait_sync.condvar.notify_all();

        if next_state == STATE_READY {
            // SAFETY: written above.
            Ok(unsafe { (*self.cell.value.get()).assume_init_ref() })
        } else {
            Err(ThunkPoisonedError)
        }
    }

    /// Spins, then blocks on the condvar, until the state leaves
    /// `STATE_COMPUTING`.
    fn wait_for_evaluation(&self) {
        for _ in 0..ADAPTIVE_SPIN_LIMIT {
            if self.cell.state.load(Ordering::Acquire) != STATE_COMPUTING {
                return;
            }
            std::hint::spin_loop();
        }

        let mut guard = self.cell.wait_sync.mutex.lock();
        while self.cell.state.load(Ordering::Acquire) == STATE_COMPUTING {
            self.cell.wait_sync.condvar.wait(&mut guard);
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Thunk<V> {
    /// Formats the thunk without forcing it.
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_get() {
            Some(value) => formatter.debug_tuple("Thunk").field(value).finish(),
            None if self.is_poisoned() => formatter.write_str("Thunk(<poisoned>)"),
            None => formatter.write_str("Thunk(<lazy>)"),
        }
    }
}

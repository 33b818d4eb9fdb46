//! Tuning knobs and plumbing for the fork-join tree walks.
//!
//! Parallel operations on the persistent tree split subtrees across scoped
//! worker threads and join the results through single-shot channels. Two
//! knobs govern the dispatch:
//!
//! - a size threshold: a walk only goes parallel when the tree is large
//!   enough (`2^blackHeight ≥ PAR_THRESHOLD`) for the fork overhead to pay
//!   off;
//! - a recursion budget: each operation starts with a worker budget derived
//!   from the processor count, and every split hands each side
//!   `(budget - 2) / 2`, charging two workers per split. A walk that runs
//!   out of budget continues sequentially in place.

use std::num::NonZeroUsize;
use std::thread;

/// Minimum `2^blackHeight` for a walk to be dispatched in parallel.
pub(crate) const PAR_THRESHOLD: u64 = 1024;

/// Worker budget multiplier over the processor count. The operations are
/// short and partly memory-bound, so the budget oversubscribes the
/// processors.
pub(crate) const PAR_MULT: usize = 4;

/// Returns the worker budget for one parallel operation:
/// `PAR_MULT × processors − 1`.
///
/// The processor count is read once per call, so a budget is consistent for
/// the duration of the operation that requested it.
pub(crate) fn worker_budget() -> usize {
    let processors = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    PAR_MULT * processors - 1
}

/// Returns `true` when a tree of the given black-height clears
/// [`PAR_THRESHOLD`].
pub(crate) const fn meets_threshold(black_height: usize) -> bool {
    // A black-height of 64 or more cannot occur (the tree would not fit in
    // memory), but saturate anyway rather than overflow the shift.
    if black_height >= u64::BITS as usize {
        return true;
    }
    (1u64 << black_height) >= PAR_THRESHOLD
}

/// Splits a budget across the two sides of a fork, charging two workers.
pub(crate) const fn split_budget(budget: usize) -> usize {
    budget.saturating_sub(2) / 2
}

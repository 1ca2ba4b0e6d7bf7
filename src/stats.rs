//! Debug counters for lock and splice activity.
//!
//! Process-wide, `Relaxed` increments only. These exist to diagnose contention
//! in stress runs and the workload binary, not for exact accounting: counts
//! from concurrently running tests in one process mix together.

use std::fmt as StdFmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Successful node lock acquisitions.
pub static LOCK_ACQUIRE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Acquisitions whose fast `try_lock` failed and had to wait.
pub static LOCK_CONTENDED_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Timed acquisitions that gave up.
pub static LOCK_TIMEOUT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Descents abandoned after a timeout and restarted from the root.
pub static RETRY_FROM_ROOT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Removals resolved by splicing out the in-order successor.
pub static SPLICE_SUCCESSOR_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Removals resolved by splicing out the in-order predecessor.
pub static SPLICE_PREDECESSOR_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Removals of a childless node, unlinked directly from its parent.
pub static UNLINK_LEAF_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Snapshot of every debug counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugCounters {
    /// See [`LOCK_ACQUIRE_COUNT`].
    pub lock_acquire: usize,
    /// See [`LOCK_CONTENDED_COUNT`].
    pub lock_contended: usize,
    /// See [`LOCK_TIMEOUT_COUNT`].
    pub lock_timeout: usize,
    /// See [`RETRY_FROM_ROOT_COUNT`].
    pub retry_from_root: usize,
    /// See [`SPLICE_SUCCESSOR_COUNT`].
    pub splice_successor: usize,
    /// See [`SPLICE_PREDECESSOR_COUNT`].
    pub splice_predecessor: usize,
    /// See [`UNLINK_LEAF_COUNT`].
    pub unlink_leaf: usize,
}

impl DebugCounters {
    /// Total completed structural removals.
    #[must_use]
    pub const fn removals(&self) -> usize {
        self.splice_successor + self.splice_predecessor + self.unlink_leaf
    }
}

impl StdFmt::Display for DebugCounters {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        writeln!(f, "lock acquired:      {}", self.lock_acquire)?;
        writeln!(f, "lock contended:     {}", self.lock_contended)?;
        writeln!(f, "lock timed out:     {}", self.lock_timeout)?;
        writeln!(f, "retried from root:  {}", self.retry_from_root)?;
        writeln!(f, "successor splices:  {}", self.splice_successor)?;
        writeln!(f, "predecessor splices:{}", self.splice_predecessor)?;
        write!(f, "leaf unlinks:       {}", self.unlink_leaf)
    }
}

/// Read all counters.
#[must_use]
pub fn debug_counters() -> DebugCounters {
    DebugCounters {
        lock_acquire: LOCK_ACQUIRE_COUNT.load(Ordering::Relaxed),
        lock_contended: LOCK_CONTENDED_COUNT.load(Ordering::Relaxed),
        lock_timeout: LOCK_TIMEOUT_COUNT.load(Ordering::Relaxed),
        retry_from_root: RETRY_FROM_ROOT_COUNT.load(Ordering::Relaxed),
        splice_successor: SPLICE_SUCCESSOR_COUNT.load(Ordering::Relaxed),
        splice_predecessor: SPLICE_PREDECESSOR_COUNT.load(Ordering::Relaxed),
        unlink_leaf: UNLINK_LEAF_COUNT.load(Ordering::Relaxed),
    }
}

/// Zero all counters.
pub fn reset_debug_counters() {
    for counter in [
        &LOCK_ACQUIRE_COUNT,
        &LOCK_CONTENDED_COUNT,
        &LOCK_TIMEOUT_COUNT,
        &RETRY_FROM_ROOT_COUNT,
        &SPLICE_SUCCESSOR_COUNT,
        &SPLICE_PREDECESSOR_COUNT,
        &UNLINK_LEAF_COUNT,
    ] {
        counter.store(0, Ordering::Relaxed);
    }
}

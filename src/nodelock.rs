//! Filepath: src/nodelock.rs
//!
//! Exclusive per-node lock used by the lock-coupling protocol.
//!
//! [`NodeLock`] wraps a [`parking_lot::RawMutex`] so that a lock can be held
//! while the thread moves on to a *different* node's lock, which a borrowed
//! `MutexGuard<T>` cannot express without tying the child guard to the parent's
//! borrow.
//!
//! # Type-State Pattern
//! The [`NodeGuard`] type is proof that the lock is held. Node accessors that
//! read or write a key or a child slot take a `&NodeGuard` (or `&mut`) as
//! proof. The guard unlocks on drop, including during unwinding and on early
//! returns, so a timed-out descent releases everything it holds.
//!
//! ```rust
//! use coupled_bst::nodelock::NodeLock;
//!
//! let lock = NodeLock::new();
//! {
//!     let _held = lock.lock();
//!     assert!(lock.is_locked());
//!     assert!(lock.try_lock().is_none());
//! }
//! assert!(!lock.is_locked());
//! ```
//!
//! # Instrumentation
//! Each lock counts its current holders and remembers the largest count it
//! ever saw. Under a correct protocol that maximum is 1.

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
#[cfg(feature = "tracing")]
use std::time::Instant;

use parking_lot::RawMutex;
use parking_lot::lock_api::{RawMutex as RawMutexApi, RawMutexTimed};

use crate::stats::{LOCK_ACQUIRE_COUNT, LOCK_CONTENDED_COUNT, LOCK_TIMEOUT_COUNT};
use crate::tracing_helpers::warn_log;

/// Waits longer than this are reported as `SLOW_LOCK` when tracing is enabled.
#[cfg(feature = "tracing")]
const SLOW_LOCK_THRESHOLD: Duration = Duration::from_millis(10);

// ============================================================================
//  LockTimedOut
// ============================================================================

/// A timed acquisition gave up before the lock became free.
///
/// Carries no data: by the time a caller sees it, every guard the descent held
/// has already been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimedOut;

impl StdFmt::Display for LockTimedOut {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "timed out waiting for a node lock")
    }
}

impl std::error::Error for LockTimedOut {}

// ============================================================================
//  NodeLock
// ============================================================================

/// An exclusive, non-reentrant lock scoped to a single node.
pub struct NodeLock {
    raw: RawMutex,

    /// Threads currently inside the critical section. Never above 1.
    holders: AtomicU32,

    /// Largest value `holders` ever reached.
    max_holders: AtomicU32,
}

// ============================================================================
//  NodeGuard (Type-State Pattern)
// ============================================================================

/// Proof that a [`NodeLock`] is held by the current thread.
///
/// Cannot be constructed except through [`NodeLock::lock`],
/// [`NodeLock::lock_within`] or [`NodeLock::try_lock`].
///
/// Guards are `!Send` and `!Sync` via `PhantomData<*mut ()>`: a parking lot
/// raw mutex must be unlocked by the thread that locked it.
#[must_use = "dropping the guard immediately releases the lock"]
pub struct NodeGuard<'a> {
    lock: &'a NodeLock,
    _marker: PhantomData<*mut ()>,
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        self.lock.holders.fetch_sub(1, Ordering::Release);

        // SAFETY: a guard only exists while this thread holds `raw`.
        unsafe { self.lock.raw.unlock() };
    }
}

impl StdFmt::Debug for NodeGuard<'_> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("NodeGuard")
            .field("lock", &StdPtr::from_ref(self.lock))
            .finish()
    }
}

impl NodeGuard<'_> {
    /// Whether this guard holds `lock`.
    #[inline]
    #[must_use]
    pub fn guards(&self, lock: &NodeLock) -> bool {
        StdPtr::eq(self.lock, lock)
    }
}

impl NodeLock {
    /// Create an unlocked lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: <RawMutex as RawMutexApi>::INIT,
            holders: AtomicU32::new(0),
            max_holders: AtomicU32::new(0),
        }
    }

    /// Block until the lock is acquired.
    ///
    /// The thread parks while waiting; there is no spinning beyond what
    /// `parking_lot` does internally.
    pub fn lock(&self) -> NodeGuard<'_> {
        if self.raw.try_lock() {
            return self.enter();
        }

        LOCK_CONTENDED_COUNT.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        let start = Instant::now();

        self.raw.lock();

        #[cfg(feature = "tracing")]
        self.report_wait(start);

        self.enter()
    }

    /// Acquire the lock, giving up after `timeout`.
    ///
    /// `None` waits forever and therefore never fails.
    ///
    /// # Errors
    ///
    /// Returns [`LockTimedOut`] if the lock was still held by another thread
    /// when `timeout` elapsed.
    pub fn lock_within(&self, timeout: Option<Duration>) -> Result<NodeGuard<'_>, LockTimedOut> {
        let Some(timeout) = timeout else {
            return Ok(self.lock());
        };

        if self.raw.try_lock() {
            return Ok(self.enter());
        }

        LOCK_CONTENDED_COUNT.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        let start = Instant::now();

        if !self.raw.try_lock_for(timeout) {
            LOCK_TIMEOUT_COUNT.fetch_add(1, Ordering::Relaxed);
            warn_log!(
                lock = ?StdPtr::from_ref(self),
                timeout_ms = timeout.as_millis(),
                "LOCK_TIMEOUT: giving up on node lock"
            );
            return Err(LockTimedOut);
        }

        #[cfg(feature = "tracing")]
        self.report_wait(start);

        Ok(self.enter())
    }

    /// Acquire the lock only if it is free right now.
    #[must_use]
    pub fn try_lock(&self) -> Option<NodeGuard<'_>> {
        self.raw.try_lock().then(|| self.enter())
    }

    /// Whether some thread currently holds the lock.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Largest number of simultaneous holders ever observed.
    ///
    /// Anything other than 0 (never locked) or 1 means mutual exclusion broke.
    #[inline]
    #[must_use]
    pub fn max_observed_holders(&self) -> u32 {
        self.max_holders.load(Ordering::Relaxed)
    }

    /// Record `holders` simultaneous holders without locking.
    #[cfg(test)]
    pub(crate) fn record_overlap(&self, holders: u32) {
        self.max_holders.fetch_max(holders, Ordering::Relaxed);
    }

    /// Bookkeeping shared by every successful acquisition path.
    #[inline]
    fn enter(&self) -> NodeGuard<'_> {
        LOCK_ACQUIRE_COUNT.fetch_add(1, Ordering::Relaxed);

        let previous: u32 = self.holders.fetch_add(1, Ordering::Acquire);
        self.max_holders.fetch_max(previous + 1, Ordering::Relaxed);
        debug_assert_eq!(previous, 0, "node lock entered while another holder is inside");

        NodeGuard {
            lock: self,
            _marker: PhantomData,
        }
    }

    #[cfg(feature = "tracing")]
    fn report_wait(&self, start: Instant) {
        let waited: Duration = start.elapsed();
        if waited > SLOW_LOCK_THRESHOLD {
            warn_log!(
                lock = ?StdPtr::from_ref(self),
                waited_us = waited.as_micros(),
                "SLOW_LOCK: node lock wait exceeded threshold"
            );
        }
    }
}

impl Default for NodeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl StdFmt::Debug for NodeLock {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("NodeLock")
            .field("locked", &self.is_locked())
            .field("max_observed_holders", &self.max_observed_holders())
            .finish()
    }
}

// ============================================================================
//  Tests
// ============================================================================

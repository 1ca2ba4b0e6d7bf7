//! Lock coupling (hand-over-hand locking) building blocks.
//!
//! # Protocol
//!
//! ```text
//! 1. guard = tree.collector.enter()        // keeps unlinked nodes allocated
//! 2. edge  = root_slot.lock()              // first "parent" is the root slot
//! 3. loop:
//!      child = edge.target()
//!      null  -> stop here (attach / not found)
//!      node  = child.lock()                // child locked BEFORE parent released
//!      edge  = node.into_edge(dir)         // drops the old edge: parent unlocked
//! ```
//!
//! Locks are only ever taken downward along a root-to-leaf path, and the root
//! slot is first on every path, so no wait-for cycle can form.
//!
//! An [`Edge`] is a locked parent (the root slot or a node) paired with one of
//! its child slots: exactly what is needed to attach a leaf to, or unlink a
//! node from, that slot. A [`Locked`] is a node whose own lock is held.
//! Both release on drop, which is what makes every early return, timeout and
//! panic unwind the whole held chain.

use std::fmt as StdFmt;
use std::mem as StdMem;
use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::time::Duration;

use seize::{Guard, LocalGuard};

use crate::node::{Dir, Node, node_ref};
use crate::nodelock::{LockTimedOut, NodeGuard, NodeLock};

// ============================================================================
//  RootSlot
// ============================================================================

/// The tree's entry point: an optional root pointer behind its own lock.
///
/// Guarding the slot makes the empty -> non-empty transition (and the reverse,
/// when the last node is removed) atomic with respect to other operations.
pub(crate) struct RootSlot<K> {
    lock: NodeLock,
    ptr: AtomicPtr<Node<K>>,
}

impl<K> RootSlot<K> {
    pub(crate) const fn new() -> Self {
        Self {
            lock: NodeLock::new(),
            ptr: AtomicPtr::new(StdPtr::null_mut()),
        }
    }

    /// Root pointer without locking. Only meaningful with exclusive access.
    #[inline]
    pub(crate) fn load_unguarded(&self) -> *mut Node<K> {
        self.ptr.load(Ordering::Acquire)
    }

    /// Read the root pointer under the slot lock, then release it.
    pub(crate) fn touch(&self, guard: &LocalGuard<'_>) -> *mut Node<K> {
        let _held: NodeGuard<'_> = self.lock.lock();
        guard.protect(&self.ptr, Ordering::Acquire)
    }

    /// Most simultaneous holders the slot lock has seen.
    pub(crate) fn max_observed_holders(&self) -> u32 {
        self.lock.max_observed_holders()
    }

    #[cfg(test)]
    pub(crate) const fn lock(&self) -> &NodeLock {
        &self.lock
    }

    /// Detach the whole node graph. Requires exclusive access to the tree.
    pub(crate) fn take(&mut self) -> *mut Node<K> {
        StdMem::replace(self.ptr.get_mut(), StdPtr::null_mut())
    }
}

// ============================================================================
//  Edge
// ============================================================================

/// A locked parent plus one of its child slots.
pub(crate) struct Edge<'g, K> {
    /// Lock of whoever owns `slot`: the root slot or a node. Released on drop.
    _held: NodeGuard<'g>,
    slot: &'g AtomicPtr<Node<K>>,
}

impl<'g, K> Edge<'g, K> {
    /// Lock the root slot. Every descent starts here.
    pub(crate) fn root(
        root: &'g RootSlot<K>,
        wait: Option<Duration>,
    ) -> Result<Self, LockTimedOut> {
        Ok(Self {
            _held: root.lock.lock_within(wait)?,
            slot: &root.ptr,
        })
    }

    /// The node this slot points at (null if the slot is empty).
    #[inline]
    pub(crate) fn target(&self, guard: &LocalGuard<'_>) -> *mut Node<K> {
        guard.protect(self.slot, Ordering::Acquire)
    }

    /// Lock the node this slot points at, keeping the edge locked.
    ///
    /// Returns `Ok(None)` when the slot is empty.
    pub(crate) fn descend(
        &self,
        guard: &'g LocalGuard<'_>,
        wait: Option<Duration>,
    ) -> Result<Option<Locked<'g, K>>, LockTimedOut> {
        let ptr: *mut Node<K> = self.target(guard);
        if ptr.is_null() {
            return Ok(None);
        }

        // SAFETY: `ptr` was loaded from a slot under its owner's lock while
        // `guard` is active.
        unsafe { Locked::acquire(ptr, guard, wait) }.map(Some)
    }

    /// Attach a freshly allocated leaf to this (empty) slot and unlock.
    pub(crate) fn attach(self, leaf: *mut Node<K>) {
        debug_assert!(
            self.slot.load(Ordering::Relaxed).is_null(),
            "attaching over an occupied slot"
        );
        self.slot.store(leaf, Ordering::Release);
    }

    /// Point this slot somewhere else, typically null or a grandchild.
    #[inline]
    pub(crate) fn replace(&self, ptr: *mut Node<K>) {
        self.slot.store(ptr, Ordering::Release);
    }
}

impl<K> StdFmt::Debug for Edge<'_, K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Edge")
            .field("slot", &StdPtr::from_ref(self.slot))
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  Locked
// ============================================================================

/// A node whose lock the current thread holds.
pub(crate) struct Locked<'g, K> {
    ptr: *mut Node<K>,
    node: &'g Node<K>,
    held: NodeGuard<'g>,
}

impl<'g, K> Locked<'g, K> {
    /// Lock the node at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null, loaded from a slot while its owner's lock was
    /// held, with `guard` active at the time of the load.
    pub(crate) unsafe fn acquire(
        ptr: *mut Node<K>,
        guard: &'g LocalGuard<'_>,
        wait: Option<Duration>,
    ) -> Result<Self, LockTimedOut> {
        // SAFETY: forwarded from the caller.
        let node: &'g Node<K> = unsafe { node_ref(ptr, guard) };
        let held: NodeGuard<'g> = node.lock().lock_within(wait)?;

        Ok(Self { ptr, node, held })
    }

    #[inline]
    pub(crate) const fn as_ptr(&self) -> *mut Node<K> {
        self.ptr
    }

    #[inline]
    pub(crate) fn key(&self) -> &K {
        self.node.key(&self.held)
    }

    #[inline]
    pub(crate) fn child(&self, dir: Dir, guard: &LocalGuard<'_>) -> *mut Node<K> {
        self.node.child(dir, &self.held, guard)
    }

    #[inline]
    pub(crate) fn set_child(&self, dir: Dir, child: *mut Node<K>) {
        self.node.set_child(dir, child, &self.held);
    }

    /// Lock the child in `dir`, keeping this node locked.
    ///
    /// Returns `Ok(None)` when that slot is empty.
    pub(crate) fn descend(
        &self,
        dir: Dir,
        guard: &'g LocalGuard<'_>,
        wait: Option<Duration>,
    ) -> Result<Option<Self>, LockTimedOut> {
        let ptr: *mut Node<K> = self.child(dir, guard);
        if ptr.is_null() {
            return Ok(None);
        }

        // SAFETY: loaded from our own slot under our lock, guard is active.
        unsafe { Self::acquire(ptr, guard, wait) }.map(Some)
    }

    /// Exchange keys with another locked node.
    pub(crate) fn swap_keys(&mut self, other: &mut Self) {
        self.node
            .swap_keys(&mut self.held, other.node, &mut other.held);
    }

    /// Keep this node locked as the parent of its `dir` slot.
    ///
    /// The key becomes inaccessible; only the slot remains reachable.
    pub(crate) fn into_edge(self, dir: Dir) -> Edge<'g, K> {
        Edge {
            _held: self.held,
            slot: self.node.slot(dir),
        }
    }
}

impl<K> StdFmt::Debug for Locked<'_, K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Locked")
            .field("ptr", &self.ptr)
            .finish_non_exhaustive()
    }
}

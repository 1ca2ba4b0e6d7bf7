//! Filepath: src/node.rs
//!
//! A tree node: one key, two child slots, one lock.
//!
//! # Ownership
//! Each child slot exclusively owns the node it points to. A node is allocated
//! with [`Node::alloc`] (a leaked `Box`) and freed either by the tree's `Drop`
//! or, once unlinked, by [`reclaim_node`] through `seize`. There are no parent
//! pointers: parents exist only as locals of an in-flight descent.
//!
//! # Access Rules
//! The key and both slots may only be read or written while holding
//! [`Node::lock`]. Every guarded accessor takes the [`NodeGuard`] as proof.
//! The `unguarded` accessors are for code that has exclusive access to the
//! whole tree (`&mut ConcurrentBst` or `Drop`).

use std::cell::UnsafeCell;
use std::mem as StdMem;
use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, Ordering};

use seize::{Collector, Guard, LocalGuard};

use crate::nodelock::{NodeGuard, NodeLock};

// ============================================================================
//  Dir
// ============================================================================

/// Which child slot of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dir {
    Left,
    Right,
}

impl Dir {
    /// Routing rule shared by every descent: `key <= node_key` goes left.
    ///
    /// Duplicates therefore pile up on the low side.
    #[inline]
    pub(crate) fn toward<K: Ord>(key: &K, node_key: &K) -> Self {
        if key <= node_key { Self::Left } else { Self::Right }
    }

    #[inline]
    pub(crate) const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

// ============================================================================
//  Node
// ============================================================================

/// A single tree node.
pub(crate) struct Node<K> {
    lock: NodeLock,
    key: UnsafeCell<K>,
    left: AtomicPtr<Node<K>>,
    right: AtomicPtr<Node<K>>,
}

impl<K> Node<K> {
    /// Allocate a leaf holding `key` and leak it as a raw pointer.
    ///
    /// Ownership passes to whichever slot the pointer is stored in.
    pub(crate) fn alloc(key: K) -> *mut Self {
        Box::into_raw(Box::new(Self {
            lock: NodeLock::new(),
            key: UnsafeCell::new(key),
            left: AtomicPtr::new(StdPtr::null_mut()),
            right: AtomicPtr::new(StdPtr::null_mut()),
        }))
    }

    #[inline]
    pub(crate) const fn lock(&self) -> &NodeLock {
        &self.lock
    }

    /// The raw slot for `dir`. Writers must hold [`Self::lock`].
    #[inline]
    pub(crate) const fn slot(&self, dir: Dir) -> &AtomicPtr<Self> {
        match dir {
            Dir::Left => &self.left,
            Dir::Right => &self.right,
        }
    }

    /// Read the key under the node's lock.
    #[inline]
    pub(crate) fn key<'a>(&'a self, held: &'a NodeGuard<'_>) -> &'a K {
        debug_assert!(held.guards(&self.lock), "key read without this node's lock");

        // SAFETY: the key is only written through `swap_keys`, which requires
        // this node's guard by `&mut`. `held` proves we hold that lock, and the
        // returned borrow cannot outlive it.
        unsafe { &*self.key.get() }
    }

    /// Load a child pointer under the node's lock.
    #[inline]
    pub(crate) fn child(&self, dir: Dir, held: &NodeGuard<'_>, guard: &LocalGuard<'_>) -> *mut Self {
        debug_assert!(held.guards(&self.lock), "child read without this node's lock");
        guard.protect(self.slot(dir), Ordering::Acquire)
    }

    /// Store a child pointer under the node's lock.
    #[inline]
    pub(crate) fn set_child(&self, dir: Dir, child: *mut Self, held: &NodeGuard<'_>) {
        debug_assert!(held.guards(&self.lock), "child write without this node's lock");
        self.slot(dir).store(child, Ordering::Release);
    }

    /// Exchange the keys of two distinct locked nodes.
    ///
    /// This is the in-place splice of removal: the logically removed node
    /// takes its successor's (or predecessor's) key, and the node about to be
    /// unlinked carries the removed key away.
    pub(crate) fn swap_keys(
        &self,
        held: &mut NodeGuard<'_>,
        other: &Self,
        other_held: &mut NodeGuard<'_>,
    ) {
        debug_assert!(!StdPtr::eq(self, other), "swap_keys on a single node");
        debug_assert!(held.guards(&self.lock));
        debug_assert!(other_held.guards(&other.lock));

        // SAFETY: both locks are held exclusively by this thread (the guards
        // are borrowed mutably), and the nodes are distinct, so the two
        // mutable borrows do not alias.
        unsafe { StdMem::swap(&mut *self.key.get(), &mut *other.key.get()) };
    }

    /// Read the key without locking.
    ///
    /// # Safety
    ///
    /// No other thread may be accessing the tree (the caller has `&mut` to it
    /// or is dropping it).
    #[inline]
    pub(crate) unsafe fn key_unguarded(&self) -> &K {
        // SAFETY: caller guarantees exclusive access to the whole tree.
        unsafe { &*self.key.get() }
    }

    /// Load a child pointer without locking.
    ///
    /// Same contract as [`Self::key_unguarded`], minus the `unsafe`: a stale
    /// pointer is harmless until dereferenced.
    #[inline]
    pub(crate) fn child_unguarded(&self, dir: Dir) -> *mut Self {
        self.slot(dir).load(Ordering::Acquire)
    }
}

// ============================================================================
//  Raw Pointer Helpers
// ============================================================================

/// Dereference a node pointer for as long as `guard` lives.
///
/// # Safety
///
/// `ptr` must be non-null and must have been loaded from a slot while `guard`
/// was active. A node unlinked after that load is only retired through
/// `guard.defer_retire`, so it stays allocated until `guard` is dropped.
#[inline]
pub(crate) unsafe fn node_ref<'g, K>(ptr: *mut Node<K>, _guard: &'g LocalGuard<'_>) -> &'g Node<K> {
    debug_assert!(!ptr.is_null());

    // SAFETY: see the function contract.
    unsafe { &*ptr }
}

/// Reclaim an unlinked node (seize callback).
///
/// Children are *not* followed: by the time a node is unlinked its remaining
/// child has been re-homed, so its slots may still point at live nodes owned
/// elsewhere.
///
/// # Safety
///
/// - `ptr` must come from [`Node::alloc`] and be unreachable from the tree.
/// - Must only be called after seize determines no reader remains.
pub(crate) unsafe fn reclaim_node<K>(ptr: *mut Node<K>, _collector: &Collector) {
    // SAFETY: caller guarantees ptr is from Box::into_raw and unreachable.
    unsafe { drop(Box::from_raw(ptr)) };
}

/// Free a whole subtree.
///
/// Iterative so that degenerate chains cannot overflow the stack.
///
/// # Safety
///
/// The caller must own the subtree exclusively: no concurrent access and no
/// other slot pointing into it.
pub(crate) unsafe fn free_subtree<K>(root: *mut Node<K>) {
    let mut pending: Vec<*mut Node<K>> = Vec::new();
    if !root.is_null() {
        pending.push(root);
    }

    while let Some(ptr) = pending.pop() {
        // SAFETY: every pointer on the stack came from an owning slot of the
        // exclusively owned subtree and is freed exactly once.
        let node: Box<Node<K>> = unsafe { Box::from_raw(ptr) };

        for dir in [Dir::Left, Dir::Right] {
            let child = node.child_unguarded(dir);
            if !child.is_null() {
                pending.push(child);
            }
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================

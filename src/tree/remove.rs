//! Coupled removal.
//!
//! # Protocol
//!
//! ```text
//! 1. descend as in search, but keep the edge (parent + slot) of the node
//!    holding the key: target T is locked together with its parent P
//! 2. T is a leaf:  P.slot = null                       -> T unlinked
//! 3. otherwise P is released; T stays where it is and only its key changes
//!      dir    = right if T.right exists, else left
//!      toward = opposite(dir)
//!      S      = extreme node of T.dir going `toward`, locked hand-over-hand
//!               with the node above it (still holding T)
//!      above(S).slot[toward or T.dir] = S.slot[dir]     -> S unlinked
//!      swap(T.key, S.key)
//! 4. release bottom-up, retire the unlinked node through the collector
//! ```
//!
//! Worked example, removing 50 (successor case):
//!
//! ```text
//!        50                 60
//!       /  \               /  \
//!     40    70     ->    40    70
//!    /     /  \         /        \
//!  20    60    80     20          80
//! ```
//!
//! The unlinked node keeps its own child pointers. A traversal that read a
//! pointer to it before the splice still reaches the re-homed subtree through
//! it, and reclamation never follows them.

use std::cmp::Ordering;
use std::mem as StdMem;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::time::Duration;

use seize::{Guard, LocalGuard};

use crate::error::TreeError;
use crate::node::{Dir, Node, reclaim_node};
use crate::nodelock::LockTimedOut;
use crate::stats::{SPLICE_PREDECESSOR_COUNT, SPLICE_SUCCESSOR_COUNT, UNLINK_LEAF_COUNT};
use crate::tracing_helpers::{debug_log, trace_log};

use super::coupling::{Edge, Locked};
use super::{ConcurrentBst, RetryBudget};

/// The located node and the locked edge that leads to it.
struct Target<'g, K> {
    parent: Edge<'g, K>,
    node: Locked<'g, K>,
}

/// How the removed key left the structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Splice {
    /// The target had no children and was cut off its parent.
    Leaf,
    /// The target took its in-order successor's key.
    Successor,
    /// The target had only a left subtree and took its predecessor's key.
    Predecessor,
}

impl Splice {
    fn record(self) {
        let counter = match self {
            Self::Leaf => &UNLINK_LEAF_COUNT,
            Self::Successor => &SPLICE_SUCCESSOR_COUNT,
            Self::Predecessor => &SPLICE_PREDECESSOR_COUNT,
        };
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

/// A node that no slot points at anymore.
struct Unlinked<K> {
    ptr: *mut Node<K>,
    splice: Splice,
}

impl<K: Ord> ConcurrentBst<K> {
    /// Remove one occurrence of `key`, blocking on contended locks.
    ///
    /// Returns `false` if no equal key was present. With duplicates, only the
    /// first equal key on the search path is removed.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    pub fn remove(&self, key: &K) -> bool {
        let outcome = self.remove_with(key, None, RetryBudget::unbounded());
        debug_assert!(outcome.is_ok(), "untimed waits cannot time out");
        matches!(outcome, Ok(true))
    }

    /// [`remove`](Self::remove) with bounded lock waits.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::LockTimeout`] once the retry budget is spent. No
    /// attempt writes anything before it holds every lock it needs, so a
    /// timed-out call leaves the tree unchanged.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all, err))]
    pub fn try_remove(&self, key: &K) -> Result<bool, TreeError> {
        self.remove_with(key, self.config.lock_timeout, self.timed_budget())
    }

    fn remove_with(
        &self,
        key: &K,
        wait: Option<Duration>,
        mut budget: RetryBudget,
    ) -> Result<bool, TreeError> {
        let guard = self.guard();

        loop {
            match self.remove_attempt(key, &guard, wait) {
                Ok(None) => return Ok(false),

                Ok(Some(Unlinked { ptr, splice })) => {
                    self.dec_count();
                    splice.record();
                    debug_log!(?splice, "remove: retiring unlinked node");

                    // SAFETY: `ptr` came from `Node::alloc`, and the splice
                    // just removed the only slot that pointed at it. Threads
                    // that loaded it earlier are protected until their guards
                    // drop.
                    unsafe { guard.defer_retire(ptr, reclaim_node::<K>) };
                    return Ok(true);
                }

                Err(timeout) => budget.spend(timeout)?,
            }
        }
    }

    fn remove_attempt<'g>(
        &'g self,
        key: &K,
        guard: &'g LocalGuard<'_>,
        wait: Option<Duration>,
    ) -> Result<Option<Unlinked<K>>, LockTimedOut> {
        let Some(target) = self.find_target(key, guard, wait)? else {
            return Ok(None);
        };

        Self::splice_out(target, guard, wait).map(Some)
    }

    /// Descend to the first node equal to `key`, keeping its parent locked.
    fn find_target<'g>(
        &'g self,
        key: &K,
        guard: &'g LocalGuard<'_>,
        wait: Option<Duration>,
    ) -> Result<Option<Target<'g, K>>, LockTimedOut> {
        let mut parent: Edge<'g, K> = Edge::root(&self.root, wait)?;
        let mut at_root = true;

        loop {
            let Some(node) = parent.descend(guard, wait)? else {
                if at_root {
                    debug_log!("remove on empty tree");
                }
                return Ok(None);
            };

            let dir: Dir = match key.cmp(node.key()) {
                Ordering::Equal => return Ok(Some(Target { parent, node })),
                Ordering::Less => Dir::Left,
                Ordering::Greater => Dir::Right,
            };
            trace_log!(?dir, "remove: descending");
            parent = node.into_edge(dir);
            at_root = false;
        }
    }

    /// Take the target's key out of the tree.
    ///
    /// Every lock this needs is acquired before the first write, so a timeout
    /// abandons the attempt with nothing changed.
    fn splice_out<'g>(
        target: Target<'g, K>,
        guard: &'g LocalGuard<'_>,
        wait: Option<Duration>,
    ) -> Result<Unlinked<K>, LockTimedOut> {
        let Target {
            parent,
            node: mut target,
        } = target;

        let left: *mut Node<K> = target.child(Dir::Left, guard);
        let right: *mut Node<K> = target.child(Dir::Right, guard);

        if left.is_null() && right.is_null() {
            parent.replace(std::ptr::null_mut());
            let ptr: *mut Node<K> = target.as_ptr();
            drop(target);
            drop(parent);

            return Ok(Unlinked {
                ptr,
                splice: Splice::Leaf,
            });
        }

        // The slot above the target keeps pointing at it: only its key and
        // deeper slots change from here on.
        drop(parent);

        let (dir, splice, first) = if right.is_null() {
            (Dir::Left, Splice::Predecessor, left)
        } else {
            (Dir::Right, Splice::Successor, right)
        };
        let toward: Dir = dir.opposite();

        // SAFETY: loaded from the target's slot under its lock, guard active.
        let mut first: Locked<'g, K> = unsafe { Locked::acquire(first, guard, wait)? };

        let Some(mut extreme) = first.descend(toward, guard, wait)? else {
            // `first` is itself the successor (predecessor): lift its only
            // possible subtree into the target.
            target.set_child(dir, first.child(dir, guard));
            target.swap_keys(&mut first);

            let ptr: *mut Node<K> = first.as_ptr();
            drop(first);
            drop(target);
            return Ok(Unlinked { ptr, splice });
        };

        let mut above: Locked<'g, K> = first;
        while let Some(next) = extreme.descend(toward, guard, wait)? {
            above = StdMem::replace(&mut extreme, next);
        }

        above.set_child(toward, extreme.child(dir, guard));
        target.swap_keys(&mut extreme);

        let ptr: *mut Node<K> = extreme.as_ptr();
        drop(extreme);
        drop(above);
        drop(target);
        Ok(Unlinked { ptr, splice })
    }
}

// ============================================================================
//  Tests
// ============================================================================

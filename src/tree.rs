//! Filepath: src/tree.rs
//! `ConcurrentBst` - a binary search tree with per-node lock coupling.
//!
//! This module owns the tree type, its construction and teardown, and the
//! retry-from-root policy shared by the timed operations. The operations
//! themselves live in submodules:
//!
//! | Module | Operations |
//! |--------|------------|
//! | `insert` | `insert`, `try_insert` |
//! | `remove` | `remove`, `try_remove` |
//! | `search` | `contains`, `try_contains`, `root_key` |
//! | `traverse` | `in_order`, `layout`, `render_layout` |
//! | `validate` | `check_invariants` |

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use seize::{Collector, LocalGuard};

use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::node::free_subtree;
use crate::nodelock::LockTimedOut;
use crate::stats::RETRY_FROM_ROOT_COUNT;
use crate::tracing_helpers::{debug_log, trace_log};

mod coupling;
mod insert;
mod remove;
mod search;
mod traverse;
mod validate;


use coupling::RootSlot;

// ============================================================================
//  ConcurrentBst
// ============================================================================

/// A binary search tree safe for concurrent insert, remove and lookup.
///
/// Every node has its own lock. Operations walk from the root holding at most
/// the current node and its parent (plus a short successor chain during
/// removal), so operations on disjoint paths run in parallel.
///
/// Duplicate keys are kept: they are routed into the left subtree.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use coupled_bst::ConcurrentBst;
///
/// let tree = Arc::new(ConcurrentBst::new());
///
/// let handles: Vec<_> = (0..4_u32)
///     .map(|t| {
///         let tree = Arc::clone(&tree);
///         thread::spawn(move || {
///             for i in 0..100 {
///                 tree.insert(t * 100 + i);
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
///
/// assert_eq!(tree.len(), 400);
/// assert!(tree.contains(&250));
/// assert!(tree.remove(&250));
/// assert!(!tree.contains(&250));
/// ```
pub struct ConcurrentBst<K> {
    /// Memory reclamation collector. Unlinked nodes are retired through it so
    /// that a traversal holding a stale child pointer never sees freed memory.
    collector: Collector,

    /// Lock-guarded root pointer; the only way into the node graph.
    root: RootSlot<K>,

    /// Number of keys in the tree (atomic for concurrent access).
    count: AtomicUsize,

    config: TreeConfig,

    /// The tree owns `K` values through raw node pointers.
    _marker: PhantomData<K>,
}

// SAFETY: keys move between threads (a key inserted on one thread may be
// dropped during reclamation on another), which needs `K: Send`. Shared access
// never hands out `&K` across threads without holding that node's lock, so
// like `Mutex<K>`, `K: Sync` is not required for `Sync`.
unsafe impl<K: Send> Send for ConcurrentBst<K> {}

// SAFETY: see above.
unsafe impl<K: Send> Sync for ConcurrentBst<K> {}

impl<K> ConcurrentBst<K> {
    /// Create an empty tree with the default [`TreeConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty tree with `config`.
    #[must_use]
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            collector: Collector::new(),
            root: RootSlot::new(),
            count: AtomicUsize::new(0),
            config,
            _marker: PhantomData,
        }
    }

    /// Number of keys in the tree, duplicates included.
    ///
    /// Updated after each insert or remove completes, so under concurrent
    /// mutation it may briefly lag the structure.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(AtomicOrdering::Relaxed)
    }

    /// Check if the tree is empty.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configuration this tree was built with.
    #[must_use]
    pub const fn config(&self) -> &TreeConfig {
        &self.config
    }

    // ========================================================================
    //  Internal Helpers
    // ========================================================================

    /// Enter a protected region for the duration of one operation.
    #[inline]
    pub(crate) fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    #[inline]
    pub(crate) fn inc_count(&self) {
        self.count.fetch_add(1, AtomicOrdering::Relaxed);
    }

    #[inline]
    pub(crate) fn dec_count(&self) {
        self.count.fetch_sub(1, AtomicOrdering::Relaxed);
    }

    /// Retry budget of a timed operation.
    pub(crate) const fn timed_budget(&self) -> RetryBudget {
        RetryBudget::bounded(self.config.max_retries)
    }
}

impl<K> Default for ConcurrentBst<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> StdFmt::Debug for ConcurrentBst<K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("ConcurrentBst")
            .field("len", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K> Drop for ConcurrentBst<K> {
    fn drop(&mut self) {
        // No concurrent access is possible here (Drop requires unique access).
        // Retired nodes are freed by the collector when it drops right after.
        let root = self.root.take();
        debug_log!(len = self.len(), "tearing down tree");

        // SAFETY: `&mut self` rules out any other accessor, and nodes still
        // reachable from the root are owned by exactly one slot each.
        unsafe { free_subtree(root) };
    }
}

// ============================================================================
//  RetryBudget
// ============================================================================

/// How many times an operation may restart from the root after a timeout.
///
/// A timed-out attempt has already dropped every guard it held and has not
/// mutated anything (all writes happen after the last lock of an attempt is
/// taken), so restarting is always safe.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryBudget {
    /// `None` = unlimited (untimed waits never time out anyway).
    remaining: Option<usize>,
    attempts: usize,
}

impl RetryBudget {
    pub(crate) const fn unbounded() -> Self {
        Self {
            remaining: None,
            attempts: 1,
        }
    }

    pub(crate) const fn bounded(retries: usize) -> Self {
        Self {
            remaining: Some(retries),
            attempts: 1,
        }
    }

    /// Account for a timed-out attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::LockTimeout`] once the budget is spent.
    pub(crate) fn spend(&mut self, _timeout: LockTimedOut) -> Result<(), TreeError> {
        match self.remaining.as_mut() {
            Some(0) => {
                return Err(TreeError::LockTimeout {
                    attempts: self.attempts,
                });
            }
            Some(left) => *left -= 1,
            None => {}
        }

        self.attempts += 1;
        RETRY_FROM_ROOT_COUNT.fetch_add(1, AtomicOrdering::Relaxed);
        trace_log!(attempt = self.attempts, "restarting descent from root");
        Ok(())
    }
}

// ============================================================================
//  Tests
// ============================================================================

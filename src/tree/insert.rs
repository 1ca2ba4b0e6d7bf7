//! Coupled insertion.
//!
//! # Protocol
//!
//! ```text
//! 1. guard = tree.collector.enter()
//! 2. edge = lock(root slot)
//! 3. while edge points at a node:
//!      lock(node)                       // before the edge is released
//!      edge = node's slot toward key    // key <= node.key -> left
//! 4. edge.attach(new leaf)              // sole success exit, unlocks
//! 5. count += 1
//! ```
//!
//! An empty tree is the degenerate case where step 3 never runs: the new root
//! is installed while the root slot is locked, so two first inserters cannot
//! both believe the tree is empty.

use std::time::Duration;

use seize::LocalGuard;

use crate::error::TreeError;
use crate::node::{Dir, Node};
use crate::nodelock::LockTimedOut;
use crate::tracing_helpers::{debug_log, trace_log};

use super::coupling::Edge;
use super::{ConcurrentBst, RetryBudget};

impl<K: Ord> ConcurrentBst<K> {
    /// Insert `key`, blocking on contended locks.
    ///
    /// Always succeeds. A key equal to an existing one is stored again, in the
    /// left subtree of its first equal ancestor.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    pub fn insert(&self, key: K) {
        let outcome = self.insert_with(key, None, RetryBudget::unbounded());
        debug_assert!(outcome.is_ok(), "untimed waits cannot time out");
    }

    /// Insert `key`, waiting at most [`TreeConfig::lock_timeout`] per lock.
    ///
    /// [`TreeConfig::lock_timeout`]: crate::TreeConfig::lock_timeout
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::LockTimeout`] if every attempt (the first plus
    /// [`TreeConfig::max_retries`](crate::TreeConfig::max_retries) restarts)
    /// timed out. The key is dropped and the tree is unchanged.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all, err))]
    pub fn try_insert(&self, key: K) -> Result<(), TreeError> {
        self.insert_with(key, self.config.lock_timeout, self.timed_budget())
    }

    fn insert_with(
        &self,
        key: K,
        wait: Option<Duration>,
        mut budget: RetryBudget,
    ) -> Result<(), TreeError> {
        let guard = self.guard();

        let edge: Edge<'_, K> = loop {
            match self.find_insert_edge(&key, &guard, wait) {
                Ok(edge) => break edge,
                Err(timeout) => budget.spend(timeout)?,
            }
        };

        edge.attach(Node::alloc(key));
        self.inc_count();
        Ok(())
    }

    /// Walk down to the empty slot where `key` belongs and return it locked.
    fn find_insert_edge<'g>(
        &'g self,
        key: &K,
        guard: &'g LocalGuard<'_>,
        wait: Option<Duration>,
    ) -> Result<Edge<'g, K>, LockTimedOut> {
        let mut edge: Edge<'g, K> = Edge::root(&self.root, wait)?;
        let Some(mut node) = edge.descend(guard, wait)? else {
            debug_log!("insert: installing root");
            return Ok(edge);
        };

        loop {
            let dir: Dir = Dir::toward(key, node.key());
            trace_log!(?dir, "insert: descending");
            edge = node.into_edge(dir);

            match edge.descend(guard, wait)? {
                Some(next) => node = next,
                None => return Ok(edge),
            }
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================

//! Coupled lookup.
//!
//! Same descent as insertion, but comparisons are three-way so the walk stops
//! at the first equal key. Holding the parent until the child is locked means
//! a concurrent removal can never splice the searched path out from under the
//! reader: it either finishes before the reader arrives or waits behind it.

use std::cmp::Ordering;
use std::time::Duration;

use seize::LocalGuard;

use crate::error::TreeError;
use crate::node::Dir;
use crate::nodelock::LockTimedOut;

use super::coupling::Edge;
use super::{ConcurrentBst, RetryBudget};

impl<K: Ord> ConcurrentBst<K> {
    /// Whether an equal key is currently present.
    #[must_use]
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    pub fn contains(&self, key: &K) -> bool {
        let outcome = self.contains_with(key, None, RetryBudget::unbounded());
        debug_assert!(outcome.is_ok(), "untimed waits cannot time out");
        matches!(outcome, Ok(true))
    }

    /// [`contains`](Self::contains) with bounded lock waits.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::LockTimeout`] once the retry budget is spent.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all, err))]
    pub fn try_contains(&self, key: &K) -> Result<bool, TreeError> {
        self.contains_with(key, self.config.lock_timeout, self.timed_budget())
    }

    /// A copy of the key currently at the root, if any.
    #[must_use]
    pub fn root_key(&self) -> Option<K>
    where
        K: Clone,
    {
        let guard = self.guard();
        let edge: Edge<'_, K> = Edge::root(&self.root, None).ok()?;
        let root = edge.descend(&guard, None).ok()??;
        Some(root.key().clone())
    }

    fn contains_with(
        &self,
        key: &K,
        wait: Option<Duration>,
        mut budget: RetryBudget,
    ) -> Result<bool, TreeError> {
        let guard = self.guard();

        loop {
            match self.search(key, &guard, wait) {
                Ok(found) => return Ok(found),
                Err(timeout) => budget.spend(timeout)?,
            }
        }
    }

    fn search<'g>(
        &'g self,
        key: &K,
        guard: &'g LocalGuard<'_>,
        wait: Option<Duration>,
    ) -> Result<bool, LockTimedOut> {
        let mut edge: Edge<'g, K> = Edge::root(&self.root, wait)?;

        while let Some(node) = edge.descend(guard, wait)? {
            let dir: Dir = match key.cmp(node.key()) {
                Ordering::Equal => return Ok(true),
                Ordering::Less => Dir::Left,
                Ordering::Greater => Dir::Right,
            };
            edge = node.into_edge(dir);
        }

        Ok(false)
    }
}

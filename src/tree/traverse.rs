//! Weakly consistent traversals.
//!
//! Traversals never hold more than one lock: each node is locked just long
//! enough to copy its key and read its two child pointers ("touch"), then
//! released before moving on. Under concurrent mutation the result may mix
//! states from different moments. A node unlinked by a removal stays
//! reachable through pointers read before the splice, and it carries the
//! removed key, so a walk may report a key that is already gone, twice or
//! out of order. On a quiescent tree the result is exact.
//!
//! Both walks are iterative, so a degenerate (list-shaped) tree cannot
//! overflow the thread stack.

use std::fmt::Display;

use seize::LocalGuard;

use crate::node::{Dir, Node, node_ref};

use super::ConcurrentBst;

/// What one touch of a node yields.
struct Touched<K> {
    key: K,
    left: *mut Node<K>,
    right: *mut Node<K>,
}

/// Lock `ptr`, copy out its key and children, unlock.
///
/// # Safety
///
/// `ptr` must be non-null and loaded from a slot under its owner's lock while
/// `guard` was active.
unsafe fn touch<K: Clone>(ptr: *mut Node<K>, guard: &LocalGuard<'_>) -> Touched<K> {
    // SAFETY: forwarded from the caller.
    let node: &Node<K> = unsafe { node_ref(ptr, guard) };
    let held = node.lock().lock();

    Touched {
        key: node.key(&held).clone(),
        left: node.child(Dir::Left, &held, guard),
        right: node.child(Dir::Right, &held, guard),
    }
}

enum Step<K> {
    Visit(*mut Node<K>),
    Emit(K),
}

impl<K: Clone> ConcurrentBst<K> {
    /// All keys in ascending order, duplicates included.
    #[must_use]
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    pub fn in_order(&self) -> Vec<K> {
        let guard = self.guard();
        let mut keys: Vec<K> = Vec::with_capacity(self.len());
        let mut stack: Vec<Step<K>> = Vec::new();

        let root: *mut Node<K> = self.root.touch(&guard);
        if !root.is_null() {
            stack.push(Step::Visit(root));
        }

        while let Some(step) = stack.pop() {
            match step {
                Step::Emit(key) => keys.push(key),

                Step::Visit(ptr) => {
                    // SAFETY: `ptr` is the root or a child read by `touch`,
                    // both under the owner's lock with `guard` active.
                    let Touched { key, left, right } = unsafe { touch(ptr, &guard) };

                    if !right.is_null() {
                        stack.push(Step::Visit(right));
                    }
                    stack.push(Step::Emit(key));
                    if !left.is_null() {
                        stack.push(Step::Visit(left));
                    }
                }
            }
        }

        keys
    }

    /// Keys level by level, root first, each level left to right.
    ///
    /// Empty slots are skipped, so the shape is only fully recoverable for
    /// complete levels. Intended for diagnostics and tests.
    #[must_use]
    pub fn layout(&self) -> Vec<Vec<K>> {
        let guard = self.guard();
        let mut levels: Vec<Vec<K>> = Vec::new();
        let mut frontier: Vec<*mut Node<K>> = Vec::new();

        let root: *mut Node<K> = self.root.touch(&guard);
        if !root.is_null() {
            frontier.push(root);
        }

        while !frontier.is_empty() {
            let mut level: Vec<K> = Vec::with_capacity(frontier.len());
            let mut next: Vec<*mut Node<K>> = Vec::with_capacity(frontier.len() * 2);

            for ptr in frontier {
                // SAFETY: same provenance as in `in_order`.
                let Touched { key, left, right } = unsafe { touch(ptr, &guard) };
                level.push(key);
                next.extend([left, right].into_iter().filter(|child| !child.is_null()));
            }

            levels.push(level);
            frontier = next;
        }

        levels
    }

    /// [`layout`](Self::layout) as text: one line per level, keys separated
    /// by single spaces.
    #[must_use]
    pub fn render_layout(&self) -> String
    where
        K: Display,
    {
        self.layout()
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

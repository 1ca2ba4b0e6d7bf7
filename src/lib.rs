//! # `coupled-bst`
//!
//! A concurrent, unbalanced binary search tree with one lock per node.
//!
//! Every operation walks down from the root using lock coupling
//! (hand-over-hand locking): a node's lock is acquired before its parent's is
//! released, so a thread always holds at most a parent/child pair, plus a
//! short chain while it searches for a removal successor. Operations on
//! disjoint paths proceed in parallel, and locks are only ever taken
//! top-down, so the protocol cannot deadlock.
//!
//! ## Operations
//!
//! | Operation | Locks held at once | Blocking variant | Timed variant |
//! |-----------|--------------------|------------------|---------------|
//! | insert | parent + child | [`ConcurrentBst::insert`] | [`ConcurrentBst::try_insert`] |
//! | remove | target + successor chain | [`ConcurrentBst::remove`] | [`ConcurrentBst::try_remove`] |
//! | lookup | parent + child | [`ConcurrentBst::contains`] | [`ConcurrentBst::try_contains`] |
//! | traversal | one node | [`ConcurrentBst::in_order`], [`ConcurrentBst::layout`] | - |
//!
//! Timed variants wait at most [`TreeConfig::lock_timeout`] for each lock,
//! release everything and restart from the root on timeout, and give up with
//! [`TreeError::LockTimeout`] after [`TreeConfig::max_retries`] restarts.
//!
//! ## Example
//!
//! ```rust
//! use coupled_bst::ConcurrentBst;
//!
//! let tree = ConcurrentBst::new();
//! for key in [50, 30, 70, 20, 40, 60, 80] {
//!     tree.insert(key);
//! }
//!
//! assert!(tree.remove(&30));
//! assert!(tree.remove(&50));
//! assert_eq!(tree.in_order(), vec![20, 40, 60, 70, 80]);
//! assert_eq!(tree.root_key(), Some(60));
//! ```
//!
//! ## Semantics
//!
//! - Duplicates are allowed and routed left (`key <= node` goes left).
//!   [`ConcurrentBst::remove`] removes one occurrence.
//! - The tree is never rebalanced. Sorted insertion degrades it to a list;
//!   all walks are iterative, so that costs time but not stack.
//! - Traversals are weakly consistent: exact on a quiescent tree, a mix of
//!   moments under concurrent mutation.
//! - Removed nodes are reclaimed through [`seize`], so a thread that read a
//!   pointer just before a removal never touches freed memory.
//!
//! ## Logging
//!
//! With the `tracing` feature, public operations are instrumented and lock
//! timeouts, slow lock waits and invariant violations are logged through
//! [`tracing`](https://docs.rs/tracing). Without it, logging compiles away.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod nodelock;
pub mod stats;

mod node;
mod tracing_helpers;
mod tree;

// Re-export main types for convenience
pub use config::TreeConfig;
pub use error::{InvariantViolation, Side, TreeError};
pub use stats::{DebugCounters, debug_counters, reset_debug_counters};
pub use tree::ConcurrentBst;

//! Quiescent structural checker.
//!
//! Walks the tree without taking any lock. Exclusive access is enforced by
//! the `&mut self` receiver, so this can only run once every thread that
//! shared the tree has finished (e.g. after `Arc::try_unwrap` or at the end
//! of a `thread::scope`).

use std::fmt::Debug;

use crate::error::{InvariantViolation, Side};
use crate::node::{Dir, Node};
use crate::tracing_helpers::error_log;

use super::ConcurrentBst;

/// A node to check and the open interval its key must fall in.
///
/// `lower` is exclusive (right-subtree ancestor), `upper` inclusive
/// (left-subtree ancestor, where duplicates live).
struct Pending<'t, K> {
    node: &'t Node<K>,
    lower: Option<&'t K>,
    upper: Option<&'t K>,
}

impl<K: Ord + Debug> ConcurrentBst<K> {
    /// Verify the ordering invariant on every node, that no node lock ever
    /// had two holders at once, and that [`len`] matches the number of
    /// reachable nodes.
    ///
    /// [`len`]: Self::len
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn check_invariants(&mut self) -> Result<(), InvariantViolation> {
        let holders: u32 = self.root.max_observed_holders();
        if holders > 1 {
            error_log!(holders, "root slot lock overlap");
            return Err(InvariantViolation::LockOverlap {
                key: "<root slot>".to_owned(),
                holders,
            });
        }

        let mut counted: usize = 0;
        let mut stack: Vec<Pending<'_, K>> = Vec::new();

        let root: *mut Node<K> = self.root.load_unguarded();
        if !root.is_null() {
            // SAFETY: `&mut self` excludes every other accessor, and reachable
            // nodes are alive until the tree frees them.
            let node: &Node<K> = unsafe { &*root };
            stack.push(Pending {
                node,
                lower: None,
                upper: None,
            });
        }

        while let Some(Pending { node, lower, upper }) = stack.pop() {
            // SAFETY: exclusive access, see above.
            let key: &K = unsafe { node.key_unguarded() };

            if let Some(bound) = lower.filter(|bound| key <= *bound) {
                return Err(report(key, bound, Side::Right));
            }
            if let Some(bound) = upper.filter(|bound| key > *bound) {
                return Err(report(key, bound, Side::Left));
            }
            let holders: u32 = node.lock().max_observed_holders();
            if holders > 1 {
                error_log!(?key, holders, "node lock overlap");
                return Err(InvariantViolation::LockOverlap {
                    key: format!("{key:?}"),
                    holders,
                });
            }
            counted += 1;

            for (dir, lower, upper) in [
                (Dir::Left, lower, Some(key)),
                (Dir::Right, Some(key), upper),
            ] {
                let child: *mut Node<K> = node.child_unguarded(dir);
                if !child.is_null() {
                    // SAFETY: exclusive access, see above.
                    let node: &Node<K> = unsafe { &*child };
                    stack.push(Pending { node, lower, upper });
                }
            }
        }

        let recorded: usize = self.len();
        if counted == recorded {
            Ok(())
        } else {
            error_log!(counted, recorded, "size mismatch");
            Err(InvariantViolation::SizeMismatch { counted, recorded })
        }
    }
}

fn report<K: Debug>(key: &K, bound: &K, side: Side) -> InvariantViolation {
    error_log!(?key, ?bound, ?side, "ordering violated");
    InvariantViolation::OrderViolation {
        key: format!("{key:?}"),
        bound: format!("{bound:?}"),
        side,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::super::ConcurrentBst;
    use crate::error::{InvariantViolation, Side};
    use crate::node::Dir;

    #[test]
    fn test_valid_trees_pass() {
        let mut empty: ConcurrentBst<i32> = ConcurrentBst::new();
        assert_eq!(empty.check_invariants(), Ok(()));

        let mut tree = ConcurrentBst::new();
        for key in [50, 30, 70, 20, 40, 60, 80, 50, 30] {
            tree.insert(key);
        }
        assert_eq!(tree.check_invariants(), Ok(()));

        assert!(tree.remove(&50));
        assert!(tree.remove(&30));
        assert_eq!(tree.check_invariants(), Ok(()));
    }

    #[test]
    fn test_detects_swapped_children() {
        let mut tree = ConcurrentBst::new();
        for key in [50, 30, 70] {
            tree.insert(key);
        }

        let root = tree.root.load_unguarded();
        // SAFETY: the tree is not shared.
        let root = unsafe { &*root };
        let left = root.slot(Dir::Left).load(Ordering::Relaxed);
        let right = root.slot(Dir::Right).load(Ordering::Relaxed);
        root.slot(Dir::Left).store(right, Ordering::Relaxed);
        root.slot(Dir::Right).store(left, Ordering::Relaxed);

        let err = tree.check_invariants();
        assert!(
            matches!(
                err,
                Err(InvariantViolation::OrderViolation {
                    ref key,
                    ref bound,
                    side: Side::Left | Side::Right,
                }) if (key == "70" && bound == "50") || (key == "30" && bound == "50")
            ),
            "unexpected result: {err:?}"
        );
    }

    #[test]
    fn test_detects_deep_violation() {
        let mut tree = ConcurrentBst::new();
        for key in [50, 30, 40] {
            tree.insert(key);
        }

        // Move 40 from 30's right slot to its left slot: 40 > 30.
        let root = tree.root.load_unguarded();
        // SAFETY: the tree is not shared.
        let thirty = unsafe { &*(*root).slot(Dir::Left).load(Ordering::Relaxed) };
        let forty = thirty.slot(Dir::Right).swap(std::ptr::null_mut(), Ordering::Relaxed);
        thirty.slot(Dir::Left).store(forty, Ordering::Relaxed);

        assert_eq!(
            tree.check_invariants(),
            Err(InvariantViolation::OrderViolation {
                key: "40".into(),
                bound: "30".into(),
                side: Side::Left,
            })
        );
    }

    #[test]
    fn test_detects_root_slot_overlap() {
        let mut tree = ConcurrentBst::new();
        for key in [50, 30, 70] {
            tree.insert(key);
        }
        tree.root.lock().record_overlap(2);

        assert_eq!(
            tree.check_invariants(),
            Err(InvariantViolation::LockOverlap {
                key: "<root slot>".into(),
                holders: 2,
            })
        );
    }

    #[test]
    fn test_detects_node_overlap() {
        let mut tree = ConcurrentBst::new();
        for key in [50, 30, 70, 20, 40] {
            tree.insert(key);
        }

        let root = tree.root.load_unguarded();
        // SAFETY: the tree is not shared.
        let thirty = unsafe { &*(*root).slot(Dir::Left).load(Ordering::Relaxed) };
        thirty.lock().record_overlap(2);

        assert_eq!(
            tree.check_invariants(),
            Err(InvariantViolation::LockOverlap {
                key: "30".into(),
                holders: 2,
            })
        );
    }

    #[test]
    fn test_detects_size_mismatch() {
        let mut tree = ConcurrentBst::new();
        tree.insert(1);
        tree.insert(2);
        tree.count.store(5, Ordering::Relaxed);

        assert_eq!(
            tree.check_invariants(),
            Err(InvariantViolation::SizeMismatch {
                counted: 2,
                recorded: 5,
            })
        );
        tree.count.store(2, Ordering::Relaxed);
    }
}

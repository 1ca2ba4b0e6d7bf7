//! Error types.
//!
//! Operational failures ([`TreeError`]) and findings of the quiescent
//! invariant checker ([`InvariantViolation`]) are kept apart: the first can
//! happen at any time, the second only means something when no thread is
//! mutating the tree.

use std::fmt as StdFmt;

// ============================================================================
//  TreeError
// ============================================================================

/// Errors returned by the timed `try_*` operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Every attempt timed out waiting for a node lock.
    ///
    /// All locks taken during the failed attempts have been released and the
    /// tree is unchanged by this call.
    LockTimeout {
        /// Attempts made, including the first one.
        attempts: usize,
    },
}

impl StdFmt::Display for TreeError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::LockTimeout { attempts } => {
                write!(f, "node lock wait timed out after {attempts} attempt(s)")
            }
        }
    }
}

impl std::error::Error for TreeError {}

// ============================================================================
//  InvariantViolation
// ============================================================================

/// Which side of an ancestor a misplaced key was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Under the ancestor's left slot, so it must be `<=` the ancestor key.
    Left,
    /// Under the ancestor's right slot, so it must be `>` the ancestor key.
    Right,
}

/// A broken structural invariant, reported by
/// [`ConcurrentBst::check_invariants`](crate::ConcurrentBst::check_invariants).
///
/// Keys are carried as their `Debug` rendering so the error is not generic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A key sits on the wrong side of one of its ancestors.
    OrderViolation {
        /// The misplaced key.
        key: String,
        /// The ancestor key it was compared against.
        bound: String,
        /// Which subtree of that ancestor the key is in.
        side: Side,
    },

    /// A node lock was observed with more than one holder at a time.
    LockOverlap {
        /// Key of the node (or `<root slot>`).
        key: String,
        /// Most simultaneous holders seen.
        holders: u32,
    },

    /// The recorded size disagrees with the number of reachable nodes.
    SizeMismatch {
        /// Nodes reachable from the root.
        counted: usize,
        /// Value of `len()`.
        recorded: usize,
    },
}

impl StdFmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::OrderViolation { key, bound, side } => match side {
                Side::Left => write!(f, "key {key} in left subtree of {bound} but greater than it"),
                Side::Right => {
                    write!(f, "key {key} in right subtree of {bound} but not greater than it")
                }
            },

            Self::LockOverlap { key, holders } => {
                write!(f, "lock of {key} was held by {holders} threads at once")
            }

            Self::SizeMismatch { counted, recorded } => {
                write!(f, "{counted} reachable nodes but len() is {recorded}")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_display() {
        let err = TreeError::LockTimeout { attempts: 4 };
        assert_eq!(err.to_string(), "node lock wait timed out after 4 attempt(s)");
    }

    #[test]
    fn test_violation_display_names_side() {
        let left = InvariantViolation::OrderViolation {
            key: "9".into(),
            bound: "5".into(),
            side: Side::Left,
        };
        assert!(left.to_string().contains("left subtree of 5"));

        let size = InvariantViolation::SizeMismatch {
            counted: 2,
            recorded: 3,
        };
        assert_eq!(size.to_string(), "2 reachable nodes but len() is 3");

        let overlap = InvariantViolation::LockOverlap {
            key: "7".into(),
            holders: 2,
        };
        assert_eq!(overlap.to_string(), "lock of 7 was held by 2 threads at once");
    }
}

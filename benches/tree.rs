//! Benchmarks for `ConcurrentBst` operations using Divan.
//!
//! Run with: `cargo bench --bench tree`
//!
//! Keys are scattered with a splitmix64 finalizer so the unbalanced tree
//! stays close to logarithmic depth; `sequential_chain` shows the
//! degenerate case for comparison.

#![allow(clippy::cast_possible_truncation)]

use coupled_bst::ConcurrentBst;
use divan::{Bencher, black_box};
use std::sync::Arc;
use std::thread;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    divan::main();
}

fn scatter(i: u64) -> u64 {
    let mut z = i.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn setup_tree(n: usize) -> ConcurrentBst<u64> {
    let tree = ConcurrentBst::new();
    for i in 0..n as u64 {
        tree.insert(scatter(i));
    }
    tree
}

// =============================================================================
// Construction
// =============================================================================

#[divan::bench_group]
mod construction {
    use super::{Bencher, ConcurrentBst};

    #[divan::bench]
    fn new_empty() -> ConcurrentBst<u64> {
        ConcurrentBst::new()
    }

    #[divan::bench]
    fn new_and_drop_100(bencher: Bencher) {
        bencher.bench_local(|| super::setup_tree(100));
    }
}

// =============================================================================
// Insert
// =============================================================================

#[divan::bench_group]
mod insert {
    use super::{Bencher, ConcurrentBst, scatter};

    #[divan::bench]
    fn insert_single(bencher: Bencher) {
        bencher
            .with_inputs(ConcurrentBst::<u64>::new)
            .bench_local_values(|tree| {
                tree.insert(42);
                tree
            });
    }

    #[divan::bench(args = [10, 100, 1000])]
    fn insert_scattered(bencher: Bencher, n: u64) {
        bencher
            .with_inputs(ConcurrentBst::<u64>::new)
            .bench_local_values(|tree| {
                for i in 0..n {
                    tree.insert(scatter(i));
                }
                tree
            });
    }

    #[divan::bench(args = [10, 100, 500])]
    fn sequential_chain(bencher: Bencher, n: u64) {
        bencher
            .with_inputs(ConcurrentBst::<u64>::new)
            .bench_local_values(|tree| {
                for i in 0..n {
                    tree.insert(i);
                }
                tree
            });
    }

    #[divan::bench(args = [100, 1000, 10000])]
    fn insert_into_n(bencher: Bencher, n: usize) {
        bencher
            .with_inputs(|| super::setup_tree(n))
            .bench_local_values(|tree| {
                tree.insert(scatter(n as u64));
                tree
            });
    }
}

// =============================================================================
// Contains
// =============================================================================

#[divan::bench_group]
mod contains {
    use super::{Bencher, black_box, scatter};

    #[divan::bench(args = [100, 1000, 10000])]
    fn hit(bencher: Bencher, n: usize) {
        let tree = super::setup_tree(n);
        let key = scatter(n as u64 / 2);
        bencher.bench_local(|| tree.contains(black_box(&key)));
    }

    #[divan::bench(args = [100, 1000, 10000])]
    fn miss(bencher: Bencher, n: usize) {
        let tree = super::setup_tree(n);
        let key = scatter(n as u64 + 1);
        bencher.bench_local(|| tree.contains(black_box(&key)));
    }
}

// =============================================================================
// Remove
// =============================================================================

#[divan::bench_group]
mod remove {
    use super::{Bencher, black_box, scatter};

    #[divan::bench(args = [100, 1000, 10000])]
    fn remove_one(bencher: Bencher, n: usize) {
        let key = scatter(n as u64 / 2);
        bencher
            .with_inputs(|| super::setup_tree(n))
            .bench_local_values(|tree| {
                black_box(tree.remove(&key));
                tree
            });
    }

    #[divan::bench]
    fn remove_root_of_1000(bencher: Bencher) {
        let root = scatter(0);
        bencher
            .with_inputs(|| super::setup_tree(1000))
            .bench_local_values(|tree| {
                black_box(tree.remove(&root));
                tree
            });
    }

    #[divan::bench(args = [100, 1000])]
    fn drain(bencher: Bencher, n: u64) {
        bencher
            .with_inputs(|| super::setup_tree(n as usize))
            .bench_local_values(|tree| {
                for i in 0..n {
                    tree.remove(&scatter(i));
                }
                tree
            });
    }
}

// =============================================================================
// Traversal
// =============================================================================

#[divan::bench_group]
mod traversal {
    use super::Bencher;

    #[divan::bench(args = [100, 1000, 10000])]
    fn in_order(bencher: Bencher, n: usize) {
        let tree = super::setup_tree(n);
        bencher.bench_local(|| tree.in_order());
    }

    #[divan::bench(args = [100, 1000, 10000])]
    fn layout(bencher: Bencher, n: usize) {
        let tree = super::setup_tree(n);
        bencher.bench_local(|| tree.layout());
    }
}

// =============================================================================
// Concurrent
// =============================================================================

#[divan::bench_group(sample_count = 20)]
mod concurrent {
    use super::{Arc, Bencher, ConcurrentBst, scatter, thread};

    const OPS_PER_THREAD: u64 = 2_000;

    #[divan::bench(args = [1, 2, 4, 8])]
    fn insert(bencher: Bencher, threads: u64) {
        bencher
            .with_inputs(|| Arc::new(ConcurrentBst::<u64>::new()))
            .bench_local_values(|tree| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let tree = Arc::clone(&tree);
                        thread::spawn(move || {
                            for i in 0..OPS_PER_THREAD {
                                tree.insert(scatter(t * OPS_PER_THREAD + i));
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.join();
                }
                tree
            });
    }

    /// Half the threads read prefilled keys while the rest insert and remove.
    #[divan::bench(args = [2, 4, 8])]
    fn mixed(bencher: Bencher, threads: u64) {
        bencher
            .with_inputs(|| Arc::new(super::setup_tree(OPS_PER_THREAD as usize)))
            .bench_local_values(|tree| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let tree = Arc::clone(&tree);
                        thread::spawn(move || {
                            for i in 0..OPS_PER_THREAD {
                                if t % 2 == 0 {
                                    let _ = tree.contains(&scatter(i));
                                } else {
                                    let key = scatter((t + 1) * OPS_PER_THREAD + i);
                                    tree.insert(key);
                                    tree.remove(&key);
                                }
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.join();
                }
                tree
            });
    }
}

//! Concurrent Workload Driver
//!
//! Fills a tree from several threads with pseudo-random keys, removes a
//! random subset concurrently, then prints the resulting tree and checks its
//! invariants once every worker has finished. With tracing enabled, slow
//! locks, lock timeouts and slow operations are written to a JSON log.
//!
//! Run with:
//! ```bash
//! # Defaults: 8 threads, 1000 inserts, 900 removes, keys in 0..500
//! cargo run --release --bin workload
//!
//! # Bigger run with mimalloc
//! BST_THREADS=32 BST_KEYS=200000 BST_REMOVES=150000 BST_KEY_RANGE=100000 \
//!     cargo run --release --features mimalloc --bin workload
//!
//! # With tracing (writes to logs/workload.json)
//! RUST_LOG=coupled_bst=debug,workload=warn cargo run --release --features tracing --bin workload
//!
//! # View slow operations:
//! rg "SLOW_(OP|LOCK)" logs/workload.json
//! ```

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use coupled_bst::{ConcurrentBst, TreeConfig, debug_counters, reset_debug_counters};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(feature = "tracing")]
type TracingGuard = tracing_appender::non_blocking::WorkerGuard;

#[cfg(not(feature = "tracing"))]
type TracingGuard = ();

/// Operations slower than this are reported individually.
const SLOW_OP: Duration = Duration::from_millis(100);

/// In-order dump is cut after this many keys.
const DUMP_LIMIT: usize = 64;

// =============================================================================
// Custom Tracing Initialization (JSON to file)
// =============================================================================

#[cfg(feature = "tracing")]
fn init_json_tracing() -> TracingGuard {
    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

    let log_dir = "logs";
    let filter_str =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "coupled_bst=warn,workload=warn".to_string());

    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::never(log_dir, "workload.json");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_thread_ids(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .json()
        .with_filter(EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new("warn")));

    let _ = tracing_subscriber::registry().with(file_layer).try_init();

    println!("Tracing enabled: logs/workload.json (filter: {filter_str})");

    guard
}

#[cfg(not(feature = "tracing"))]
fn init_json_tracing() -> TracingGuard {
    println!("Tracing disabled (compile with --features tracing)");
}

// =============================================================================
// Parameters
// =============================================================================

struct WorkloadConfig {
    threads: usize,
    keys: usize,
    removes: usize,
    key_range: u64,
    seed: u64,
}

impl WorkloadConfig {
    fn from_env() -> Self {
        Self {
            threads: env_or("BST_THREADS", 8_usize).max(1),
            keys: env_or("BST_KEYS", 1_000),
            removes: env_or("BST_REMOVES", 900),
            key_range: env_or("BST_KEY_RANGE", 500_u64).max(1),
            seed: env_or("BST_SEED", 0x2545_f491_4f6c_dd1d),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

// =============================================================================
// Key Generation
// =============================================================================

/// Deterministic multiplicative key stream (splitmix64 finalizer).
struct KeyStream {
    state: u64,
    range: u64,
}

impl KeyStream {
    const fn new(seed: u64, stream: u64, range: u64) -> Self {
        Self {
            state: seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15),
            range,
        }
    }

    const fn next_key(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        (z ^ (z >> 31)) % self.range
    }
}

/// Split `total` operations over `threads` workers as evenly as possible.
const fn share(total: usize, threads: usize, t: usize) -> usize {
    total / threads + if t < total % threads { 1 } else { 0 }
}

// =============================================================================
// Operation Stats (Thread-Local + Aggregation)
// =============================================================================

#[derive(Default)]
struct ThreadOpStats {
    max_op_ns: u64,
    slow_ops: u64,
    removed: u64,
    missed: u64,
}

impl ThreadOpStats {
    fn record_op(&mut self, thread: usize, op: &str, key: u64, started: Instant) {
        let elapsed = started.elapsed();
        let op_ns = elapsed.as_nanos() as u64;
        self.max_op_ns = self.max_op_ns.max(op_ns);

        if elapsed > SLOW_OP {
            self.slow_ops += 1;

            #[cfg(feature = "tracing")]
            tracing::warn!(
                thread,
                op,
                key,
                elapsed_ms = op_ns as f64 / 1_000_000.0,
                "SLOW_OP"
            );

            #[cfg(not(feature = "tracing"))]
            eprintln!(
                "[T{thread:02}] SLOW_OP: {op} key={key} took {:.2}ms",
                op_ns as f64 / 1_000_000.0
            );
        }
    }

    fn merge(&mut self, other: &Self) {
        self.max_op_ns = self.max_op_ns.max(other.max_op_ns);
        self.slow_ops += other.slow_ops;
        self.removed += other.removed;
        self.missed += other.missed;
    }
}

// =============================================================================
// Phases
// =============================================================================

fn run_phase<F>(threads: usize, work: F) -> Option<(ThreadOpStats, Duration)>
where
    F: Fn(usize) -> ThreadOpStats + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let work = Arc::clone(&work);
            thread::spawn(move || work(t))
        })
        .collect();

    let mut merged = ThreadOpStats::default();
    for handle in handles {
        let Ok(stats) = handle.join() else {
            eprintln!("worker thread panicked");
            return None;
        };
        merged.merge(&stats);
    }

    Some((merged, start.elapsed()))
}

fn print_phase(name: &str, ops: usize, stats: &ThreadOpStats, elapsed: Duration) {
    let ops_per_sec = ops as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    println!("\n--- {name} ---");
    println!("Ops:         {ops}");
    println!("Elapsed:     {elapsed:?}");
    println!("Throughput:  {ops_per_sec:.0} ops/sec");
    println!("Max op:      {:.3} ms", stats.max_op_ns as f64 / 1_000_000.0);
    println!("Slow >100ms: {}", stats.slow_ops);
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    let _guard = init_json_tracing();
    let config = WorkloadConfig::from_env();

    println!("Concurrent BST Workload");
    println!("=======================\n");
    println!(
        "{} threads, {} inserts, {} removes, keys in 0..{}, seed {:#x}",
        config.threads, config.keys, config.removes, config.key_range, config.seed
    );

    let tree: Arc<ConcurrentBst<u64>> = Arc::new(ConcurrentBst::with_config(TreeConfig::from_env()));
    reset_debug_counters();

    // Insert phase
    let (insert_stats, insert_elapsed) = {
        let tree = Arc::clone(&tree);
        let (threads, keys, range, seed) = (config.threads, config.keys, config.key_range, config.seed);
        let Some(result) = run_phase(threads, move |t| {
            let mut stats = ThreadOpStats::default();
            let mut stream = KeyStream::new(seed, t as u64, range);
            for _ in 0..share(keys, threads, t) {
                let key = stream.next_key();
                let started = Instant::now();
                tree.insert(key);
                stats.record_op(t, "insert", key, started);
            }
            stats
        }) else {
            return ExitCode::FAILURE;
        };
        result
    };
    print_phase("Insert", config.keys, &insert_stats, insert_elapsed);

    // Remove phase
    let (remove_stats, remove_elapsed) = {
        let tree = Arc::clone(&tree);
        let (threads, removes, range, seed) =
            (config.threads, config.removes, config.key_range, !config.seed);
        let Some(result) = run_phase(threads, move |t| {
            let mut stats = ThreadOpStats::default();
            let mut stream = KeyStream::new(seed, t as u64, range);
            for _ in 0..share(removes, threads, t) {
                let key = stream.next_key();
                let started = Instant::now();
                if tree.remove(&key) {
                    stats.removed += 1;
                } else {
                    stats.missed += 1;
                }
                stats.record_op(t, "remove", key, started);
            }
            stats
        }) else {
            return ExitCode::FAILURE;
        };
        result
    };
    print_phase("Remove", config.removes, &remove_stats, remove_elapsed);
    println!("Removed:     {}", remove_stats.removed);
    println!("Not found:   {}", remove_stats.missed);

    // Every worker has joined, so the tree is no longer shared.
    let Ok(mut tree) = Arc::try_unwrap(tree) else {
        eprintln!("tree still shared after all workers joined");
        return ExitCode::FAILURE;
    };

    let keys = tree.in_order();
    let shown: Vec<String> = keys.iter().take(DUMP_LIMIT).map(ToString::to_string).collect();
    println!("\n--- Tree ---");
    println!("Size:        {}", tree.len());
    println!(
        "In order:    [{}{}]",
        shown.join(", "),
        if keys.len() > DUMP_LIMIT { ", ..." } else { "" }
    );
    if let Some(root) = tree.root_key() {
        println!("Root key:    {root}");
    }

    println!("\n--- Debug Counters ---");
    println!("{}", debug_counters());

    let expected = config.keys as u64 - remove_stats.removed;
    if tree.len() as u64 != expected {
        eprintln!("\n!!! size {} but expected {expected}", tree.len());
        return ExitCode::FAILURE;
    }

    match tree.check_invariants() {
        Ok(()) => {
            println!("\nInvariants:  OK");
            ExitCode::SUCCESS
        }
        Err(violation) => {
            eprintln!("\n!!! Invariant violation: {violation}");
            ExitCode::FAILURE
        }
    }
}

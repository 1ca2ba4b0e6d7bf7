//! Shared helpers for the integration tests: tracing setup and key mixing.
//!
//! Call [`init_tracing`] at the top of a test to capture the crate's events
//! (only emitted when built with `--features tracing`).
//!
//! - `RUST_LOG`: filter directives, default `warn`
//! - `BST_LOG_DIR`: where `bst.jsonl` is appended, default `logs/`
//! - `BST_LOG_CONSOLE=0`: file output only

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the console + NDJSON file subscriber once per test binary.
pub fn init_tracing() {
    INIT.call_once(install_subscriber);
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn install_subscriber() {
    let log_dir = env::var("BST_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from);
    let console = !env::var("BST_LOG_CONSOLE").is_ok_and(|v| v == "0");

    // Tests without a writable log dir still get console output.
    let file_layer = fs::create_dir_all(&log_dir)
        .and_then(|()| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join("bst.jsonl"))
        })
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_thread_ids(true)
                .with_line_number(true)
                .json()
                .with_filter(filter())
        });

    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .compact()
            .with_filter(filter())
    });

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// ============================================================================
//  Keys
// ============================================================================

/// Scatter `i` over `0..range` (splitmix64 finalizer), so sequential loop
/// counters do not build a degenerate chain.
pub fn spread(i: u64, range: u64) -> u64 {
    let mut z = i.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    (z ^ (z >> 31)) % range
}

/// Expand a multiset (key -> copies) into the sorted key list `in_order`
/// must return.
pub fn expand<K: Clone>(multiset: &BTreeMap<K, usize>) -> Vec<K> {
    multiset
        .iter()
        .flat_map(|(key, &copies)| std::iter::repeat_n(key.clone(), copies))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
        tracing::warn!(key = 42, "subscriber installed");
    }

    #[test]
    fn test_expand_repeats_keys() {
        let multiset = BTreeMap::from([(1, 2), (4, 1)]);
        assert_eq!(expand(&multiset), vec![1, 1, 4]);
    }
}

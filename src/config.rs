//! Tree configuration.
//!
//! Only the timed `try_*` operations consult [`TreeConfig`]. The blocking
//! operations wait for every lock indefinitely.

use std::env;
use std::time::Duration;

/// Default wait per lock for timed operations.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

/// Default number of restarts from the root after a timed-out wait.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Tunables for a [`ConcurrentBst`](crate::ConcurrentBst).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use coupled_bst::TreeConfig;
///
/// let config = TreeConfig::new()
///     .with_lock_timeout(Some(Duration::from_millis(5)))
///     .with_max_retries(0);
///
/// assert_eq!(config.max_retries, 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// How long a timed operation waits for any single lock.
    /// `None` waits forever, so the `try_*` operations never fail.
    pub lock_timeout: Option<Duration>,

    /// Extra attempts, each restarting from the root, after a timeout.
    pub max_retries: usize,
}

impl TreeConfig {
    /// The default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lock_timeout: Some(DEFAULT_LOCK_TIMEOUT),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set the per-lock wait of timed operations.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Set the restart budget of timed operations.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Create config from environment variables, falling back to defaults.
    ///
    /// - `BST_LOCK_TIMEOUT_MS`: per-lock wait; `0` means wait forever.
    /// - `BST_MAX_RETRIES`: restart budget.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Some(ms) = env::var("BST_LOCK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.lock_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        if let Some(retries) = env::var("BST_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.max_retries = retries;
        }

        config
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

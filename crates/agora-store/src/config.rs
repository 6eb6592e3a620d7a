use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Merge store tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Default look-back window for time-range reads when the node has
    /// never generated a local cache: "the network head".
    pub network_head_horizon_secs: i64,
    /// Text fields at or above this size are stored zstd-compressed.
    pub compress_threshold_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            // Two days of network head.
            network_head_horizon_secs: 2 * 24 * 60 * 60,
            compress_threshold_bytes: 512,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

/// Bounded retry policy for transient storage contention.
///
/// One writer transaction wraps each entity-type bucket; if SQLite reports
/// the database busy or locked, the transaction is retried after a fixed
/// delay. A second contention failure is fatal: past one transient event,
/// contention means something is holding the database that should not be,
/// and the node must surface that rather than spin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Two means exactly one retry.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying on contention per the policy.
    ///
    /// Non-contention errors propagate immediately. When every attempt hits
    /// contention the result is [`StoreError::Contention`].
    pub fn run<T>(&self, mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Err(err) if err.is_contention() => {
                    if attempt >= self.max_attempts.max(1) {
                        return Err(StoreError::Contention);
                    }
                    warn!(attempt, delay_ms = self.delay.as_millis() as u64,
                        "storage contention, retrying");
                    thread::sleep(self.delay);
                }
                other => return other,
            }
        }
    }
}

//! Per-key exponential backoff for requeued work.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::core::types::ObjectKey;

/// Delay doubles with every failure of a key, from `base` up to `max`
#[derive(Debug)]
pub struct ItemExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl ItemExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure of `key` and return how long to wait before retrying
    pub fn when(&self, key: &ObjectKey) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        let exponent = (*count).min(31);
        *count = count.saturating_add(1);

        self.base
            .checked_mul(1u32 << exponent)
            .map(|delay| delay.min(self.max))
            .unwrap_or(self.max)
    }

    /// Number of failures recorded for `key` since it was last forgotten
    pub fn num_requeues(&self, key: &ObjectKey) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }

    /// Clear the failure history of `key`
    pub fn forget(&self, key: &ObjectKey) {
        self.failures.lock().remove(key);
    }
}

impl Default for ItemExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

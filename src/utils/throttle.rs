//! Log throttling utility
//!
//! Limits how often the same log message is recorded and counts what was
//! held back, so a stalled sensor reporting timeouts every cycle produces one
//! line per interval instead of one per frame.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Entry {
    last_logged: Instant,
    suppressed: u64,
}

/// Log throttler keyed by message kind
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use sensor_recorder::utils::LogThrottler;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
///
/// assert_eq!(throttler.check("device_timeout"), Some(0));
/// assert_eq!(throttler.check("device_timeout"), None);
/// assert_eq!(throttler.clear("device_timeout"), 1);
/// ```
pub struct LogThrottler {
    entries: Mutex<HashMap<String, Entry>>,
    interval: Duration,
}

impl LogThrottler {
    /// Create a throttler allowing one message per key per `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            interval,
        }
    }

    /// Create a throttler with the interval in seconds
    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Decide whether a message for `key` should be logged now
    ///
    /// Returns `Some(n)` when it should, where `n` is the number of messages
    /// suppressed since the last one logged, or `None` if throttled.
    pub fn check(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.last_logged) < self.interval => {
                entry.suppressed += 1;
                None
            }
            Some(entry) => {
                entry.last_logged = now;
                Some(std::mem::take(&mut entry.suppressed))
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        last_logged: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }

    /// Check if a message should be logged (not throttled)
    pub fn should_log(&self, key: &str) -> bool {
        self.check(key).is_some()
    }

    /// Forget `key` once the condition recovers, so the next occurrence is
    /// logged immediately. Returns how many messages were still suppressed.
    pub fn clear(&self, key: &str) -> u64 {
        self.entries
            .lock()
            .remove(key)
            .map(|entry| entry.suppressed)
            .unwrap_or(0)
    }

    /// Get the number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the throttler is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for LogThrottler {
    /// Create a default log throttler with 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

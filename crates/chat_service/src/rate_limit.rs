//! Sliding-window message event log for rate limiting.
//!
//! One event is recorded per turn, keyed by whatever identifies the client
//! (user id or peer address). The check is a synchronous precondition: it
//! runs before any tree mutation and never once generation has started.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Default)]
pub struct MessageEventLog {
    events: DashMap<String, Vec<DateTime<Utc>>>,
}

impl MessageEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event for `key` and return how many events fall within
    /// the trailing `window`, the new one included.
    pub fn record_and_count(&self, key: &str, window: Duration) -> usize {
        let now = Utc::now();
        let mut entry = self.events.entry(key.to_string()).or_default();
        entry.retain(|at| now.signed_duration_since(*at) <= window);
        entry.push(now);
        entry.len()
    }

    pub fn count_since(&self, key: &str, window: Duration) -> usize {
        let now = Utc::now();
        self.events
            .get(key)
            .map(|events| {
                events
                    .iter()
                    .filter(|at| now.signed_duration_since(**at) <= window)
                    .count()
            })
            .unwrap_or(0)
    }
}

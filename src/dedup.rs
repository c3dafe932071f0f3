//! Time-windowed event deduplication
//!
//! Webhook sources re-send events on timeouts and restarts. The
//! deduplicator remembers each accepted event identity for a fixed
//! retention window and rejects repeats inside it, so one provider
//! retry never becomes two outbound deliveries.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Identity filter over event ids.
///
/// Shared across concurrent webhook handlers behind a single mutex;
/// event rates are low enough that contention is a non-issue. Expired
/// entries are swept as a side effect of each call, never by a timer.
#[derive(Debug)]
pub struct Deduplicator {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Deduplicator {
    /// Create a deduplicator with the given retention window
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the event should be processed.
    ///
    /// A non-empty id accepted within the last TTL is rejected;
    /// otherwise it is recorded at the current time and accepted. An
    /// empty id always passes: identity-less events cannot be deduped
    /// and are processed every time, by policy.
    pub fn accept(&self, event_id: &str) -> bool {
        self.accept_at(event_id, Instant::now())
    }

    fn accept_at(&self, event_id: &str, now: Instant) -> bool {
        if event_id.is_empty() {
            return true;
        }

        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        seen.retain(|_, first_seen| now.duration_since(*first_seen) < self.ttl);

        match seen.get(event_id) {
            Some(_) => false,
            None => {
                seen.insert(event_id.to_string(), now);
                true
            }
        }
    }

    /// Number of identities currently tracked (post-sweep counts only).
    #[cfg(test)]
    fn len(&self) -> usize {
        match self.seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

// Sliding-window rate limiting
//
// Per-identifier admission gate: keeps the timestamps of recent accepted
// requests and admits a call only while fewer than `max_requests` fall
// inside the trailing window. Entries older than the window are lazily
// evicted on each check and never re-admitted; an identifier whose
// window drains empty is dropped from the map so it cannot grow
// without bound.
//
// State lives in a DashMap so checks for different identifiers do not
// block each other, while checks for the same identifier serialize on
// the entry lock. Not persisted; resets on process restart. This is a
// soft abuse guard, not a security boundary.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

// ---------------------------------------------------------------------------
// Clock abstraction
// ---------------------------------------------------------------------------

/// Source of the current time in unix milliseconds.
///
/// Injected so tests can drive window expiry without sleeping.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Sliding-window rate limiter keyed by an opaque identifier.
///
/// Distinct policies need distinct instances; instances never share
/// state. Construct one per concern (chat messages, auth attempts) and
/// inject it; no global singletons.
pub struct RateLimiter {
    max_requests: usize,
    window_ms: i64,
    windows: DashMap<String, Vec<i64>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_ms: u64) -> Self {
        Self::with_clock(max_requests, window_ms, Arc::new(SystemClock))
    }

    pub fn with_clock(max_requests: usize, window_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_requests,
            window_ms: window_ms as i64,
            windows: DashMap::new(),
            clock,
        }
    }

    /// Check admission for the identifier, recording the request when
    /// admitted. Evicts expired entries first.
    pub fn is_allowed(&self, identifier: &str) -> bool {
        let now = self.clock.now_ms();
        let mut entry = self.windows.entry(identifier.to_string()).or_default();
        entry.retain(|&t| now - t < self.window_ms);

        if entry.len() >= self.max_requests {
            return false;
        }
        entry.push(now);
        true
    }

    /// How many more requests the identifier may make right now.
    /// Does not record anything.
    pub fn remaining(&self, identifier: &str) -> usize {
        let now = self.clock.now_ms();
        let Some(mut entry) = self.windows.get_mut(identifier) else {
            return self.max_requests;
        };
        entry.retain(|&t| now - t < self.window_ms);
        let len = entry.len();
        if len == 0 {
            drop(entry);
            self.evict_if_empty(identifier);
        }
        self.max_requests.saturating_sub(len)
    }

    /// Unix-ms timestamp at which the oldest retained request falls out
    /// of the window. Zero when the identifier has no retained requests.
    pub fn reset_time(&self, identifier: &str) -> i64 {
        let now = self.clock.now_ms();
        let Some(mut entry) = self.windows.get_mut(identifier) else {
            return 0;
        };
        entry.retain(|&t| now - t < self.window_ms);
        match entry.iter().min() {
            Some(oldest) => oldest + self.window_ms,
            None => {
                drop(entry);
                self.evict_if_empty(identifier);
                0
            }
        }
    }

    /// Number of identifiers currently holding retained timestamps.
    pub fn tracked_identifiers(&self) -> usize {
        self.windows.len()
    }

    // The entry lock must be released before removal; `remove_if`
    // re-checks emptiness in case another thread recorded a request
    // in between.
    fn evict_if_empty(&self, identifier: &str) {
        self.windows.remove_if(identifier, |_, entry| entry.is_empty());
    }

    /// Milliseconds until the identifier is admitted again; the
    /// retry-after hint surfaced on rejection.
    pub fn retry_after_ms(&self, identifier: &str) -> i64 {
        let reset = self.reset_time(identifier);
        if reset == 0 {
            return 0;
        }
        (reset - self.clock.now_ms()).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Manually advanced clock for deterministic window tests.
    struct ManualClock {
        now: AtomicI64,
    }

    impl ManualClock {
        fn at(start: i64) -> Arc<Self> {
            Arc::new(Self {
                now: AtomicI64::new(start),
            })
        }

        fn advance(&self, ms: i64) {
            self.now.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    // ---------------------------------------------------------------
    // 1. Window admission: 3 per 1000ms, 4th rejected
    // ---------------------------------------------------------------

    #[test]
    fn fourth_request_in_window_rejected() {
        let clock = ManualClock::at(10_000);
        let limiter = RateLimiter::with_clock(3, 1000, clock.clone());

        assert!(limiter.is_allowed("user"));
        assert!(limiter.is_allowed("user"));
        assert!(limiter.is_allowed("user"));
        assert!(!limiter.is_allowed("user"));
    }

    #[test]
    fn admitted_again_after_window_elapses() {
        let clock = ManualClock::at(10_000);
        let limiter = RateLimiter::with_clock(3, 1000, clock.clone());

        for _ in 0..3 {
            assert!(limiter.is_allowed("user"));
        }
        assert!(!limiter.is_allowed("user"));

        clock.advance(1000);
        assert!(limiter.is_allowed("user"));
    }

    #[test]
    fn window_slides_rather_than_resets() {
        let clock = ManualClock::at(0);
        let limiter = RateLimiter::with_clock(2, 1000, clock.clone());

        assert!(limiter.is_allowed("user")); // t=0
        clock.advance(600);
        assert!(limiter.is_allowed("user")); // t=600
        clock.advance(300);
        assert!(!limiter.is_allowed("user")); // t=900, both retained

        clock.advance(200);
        // t=1100: the t=0 entry has expired, the t=600 entry has not.
        assert!(limiter.is_allowed("user"));
    }

    // ---------------------------------------------------------------
    // 2. Identifiers are independent
    // ---------------------------------------------------------------

    #[test]
    fn identifiers_do_not_share_windows() {
        let limiter = RateLimiter::new(1, 60_000);
        assert!(limiter.is_allowed("alice"));
        assert!(limiter.is_allowed("bob"));
        assert!(!limiter.is_allowed("alice"));
    }

    // ---------------------------------------------------------------
    // 3. Instances are isolated (no hidden shared state)
    // ---------------------------------------------------------------

    #[test]
    fn separate_instances_do_not_share_state() {
        let chat = RateLimiter::new(1, 60_000);
        let auth = RateLimiter::new(1, 60_000);
        assert!(chat.is_allowed("user"));
        assert!(auth.is_allowed("user"));
        assert!(!chat.is_allowed("user"));
    }

    // ---------------------------------------------------------------
    // 4. remaining and reset_time
    // ---------------------------------------------------------------

    #[test]
    fn remaining_counts_down_without_recording() {
        let limiter = RateLimiter::new(3, 60_000);
        assert_eq!(limiter.remaining("user"), 3);
        assert_eq!(limiter.remaining("user"), 3);
        limiter.is_allowed("user");
        assert_eq!(limiter.remaining("user"), 2);
    }

    #[test]
    fn reset_time_is_oldest_retained_plus_window() {
        let clock = ManualClock::at(5_000);
        let limiter = RateLimiter::with_clock(3, 1000, clock.clone());

        limiter.is_allowed("user"); // t=5000
        clock.advance(400);
        limiter.is_allowed("user"); // t=5400

        assert_eq!(limiter.reset_time("user"), 6_000);
        assert_eq!(limiter.retry_after_ms("user"), 600);

        clock.advance(700);
        // t=6100: the t=5000 entry expired, oldest retained is t=5400.
        assert_eq!(limiter.reset_time("user"), 6_400);
    }

    #[test]
    fn reset_time_zero_for_unknown_identifier() {
        let limiter = RateLimiter::new(3, 1000);
        assert_eq!(limiter.reset_time("nobody"), 0);
        assert_eq!(limiter.retry_after_ms("nobody"), 0);
    }

    // ---------------------------------------------------------------
    // 5. Drained identifiers are dropped from the map
    // ---------------------------------------------------------------

    #[test]
    fn identifier_evicted_once_its_window_drains() {
        let clock = ManualClock::at(0);
        let limiter = RateLimiter::with_clock(2, 1000, clock.clone());

        limiter.is_allowed("alice");
        limiter.is_allowed("bob");
        assert_eq!(limiter.tracked_identifiers(), 2);

        clock.advance(1001);
        assert_eq!(limiter.remaining("alice"), 2);
        assert_eq!(limiter.reset_time("bob"), 0);
        assert_eq!(limiter.tracked_identifiers(), 0);

        // Eviction does not forget policy: re-admission works as new.
        assert!(limiter.is_allowed("alice"));
        assert_eq!(limiter.tracked_identifiers(), 1);
    }

    // ---------------------------------------------------------------
    // 6. Scenario from the chat policy: 21st request in a minute
    // ---------------------------------------------------------------

    #[test]
    fn twenty_first_request_in_a_minute_rejected() {
        let clock = ManualClock::at(0);
        let limiter = RateLimiter::with_clock(20, 60_000, clock.clone());

        for _ in 0..20 {
            clock.advance(100);
            assert!(limiter.is_allowed("user"));
        }
        assert!(!limiter.is_allowed("user"));
    }

    // ---------------------------------------------------------------
    // 7. Concurrent checks for one identifier never over-admit
    // ---------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_same_identifier_admits_at_most_max() {
        let limiter = Arc::new(RateLimiter::new(5, 60_000));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.is_allowed("user") }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }
}

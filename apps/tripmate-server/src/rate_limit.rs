//! Fixed-window request throttling keyed by an arbitrary string
//! (`invite_create:{user}`, `invite_join:{user}`).
//!
//! State lives in the limiter instance, which is built once per process and
//! shared through the server. Windows are never persisted; a restart forgets them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    /// Count a request against `key` and report whether it is within `max_requests`
    /// for the current window.
    ///
    /// The first request opens a window of length `window`; once the window has
    /// passed, the next request starts a fresh one.
    pub fn allow(&self, key: &str, max_requests: u32, window: Duration) -> bool {
        let now = self.clock.now();
        let window =
            chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(1));
        let fresh = || Window {
            count: 1,
            reset_at: now + window,
        };

        // The entry guard holds the shard lock, so concurrent callers for one key serialize here.
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: now,
        });
        if entry.count == 0 || now > entry.reset_at {
            *entry = fresh();
        } else {
            entry.count = entry.count.saturating_add(1);
        }
        entry.count <= max_requests
    }

    /// Drop windows that have ended. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, w| now <= w.reset_at);
        before.saturating_sub(self.windows.len())
    }

    #[cfg(test)]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter() -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = RateLimiter::new(clock.clone());
        (clock, limiter)
    }

    #[test]
    fn admits_exactly_max_per_window() {
        let (_clock, limiter) = limiter();
        for _ in 0..5 {
            assert!(limiter.allow("invite_create:alice", 5, WINDOW));
        }
        assert!(!limiter.allow("invite_create:alice", 5, WINDOW));
        assert!(!limiter.allow("invite_create:alice", 5, WINDOW));
    }

    #[test]
    fn keys_are_independent() {
        let (_clock, limiter) = limiter();
        assert!(limiter.allow("invite_join:alice", 1, WINDOW));
        assert!(!limiter.allow("invite_join:alice", 1, WINDOW));
        assert!(limiter.allow("invite_join:bob", 1, WINDOW));
        assert!(limiter.allow("invite_create:alice", 1, WINDOW));
    }

    #[test]
    fn window_resets_after_it_passes() {
        let (clock, limiter) = limiter();
        assert!(limiter.allow("k", 1, WINDOW));
        assert!(!limiter.allow("k", 1, WINDOW));

        // still inside the window at exactly reset_at
        clock.advance(chrono::Duration::seconds(60));
        assert!(!limiter.allow("k", 1, WINDOW));

        clock.advance(chrono::Duration::milliseconds(1));
        assert!(limiter.allow("k", 1, WINDOW));
        assert!(!limiter.allow("k", 1, WINDOW));
    }

    #[test]
    fn purge_drops_only_finished_windows() {
        let (clock, limiter) = limiter();
        limiter.allow("old", 5, Duration::from_secs(10));
        limiter.allow("new", 5, Duration::from_secs(120));

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.tracked_keys(), 1);

        // a purged key starts over
        assert!(limiter.allow("old", 1, WINDOW));
    }

    #[test]
    fn concurrent_callers_never_exceed_max() {
        let (_clock, limiter) = limiter();
        let limiter = Arc::new(limiter);
        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let limiter = limiter.clone();
                    s.spawn(move || {
                        (0..10)
                            .filter(|_| limiter.allow("shared", 25, WINDOW))
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(admitted, 25);
    }
}

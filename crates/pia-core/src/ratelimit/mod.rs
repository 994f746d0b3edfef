//! Fixed-window rate limiting per caller key
//!
//! Windows start at the first request from a key and roll over lazily on
//! the first access after they expire.

mod store;

pub use store::{MemoryStore, RateLimitStore, WindowState};

use crate::config::RateLimitConfig;
use crate::error::{PiaError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Limiter-wide counters and configuration
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub window_secs: u64,
    pub max_requests: u32,
    pub admitted_total: u64,
    pub rejected_total: u64,
    pub tracked_keys: usize,
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    window_secs: u64,
    max_requests: u32,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window_secs", &self.window_secs)
            .field("max_requests", &self.max_requests)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Limiter backed by a fresh [`MemoryStore`]
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        let window_secs = config.window_secs.max(1);
        Self {
            store,
            window: Duration::seconds(window_secs.min(u64::from(u32::MAX)) as i64),
            window_secs,
            max_requests: config.max_requests,
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Count one request for `key` if the window has room
    pub fn admit(&self, key: &str, now: DateTime<Utc>) -> Decision {
        let window = self.window;
        let max = self.max_requests;
        let mut decision = Decision {
            allowed: false,
            remaining: 0,
            reset_at: now + window,
        };

        self.store.update(key, now, &mut |state: &mut WindowState| {
            if now >= state.window_start + window {
                *state = WindowState::new(now);
            }
            let allowed = state.count < max;
            if allowed {
                state.count += 1;
            }
            decision = Decision {
                allowed,
                remaining: max.saturating_sub(state.count),
                reset_at: state.window_start + window,
            };
        });

        let counter = if decision.allowed {
            &self.admitted
        } else {
            &self.rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if !decision.allowed {
            tracing::debug!(key, reset_at = %decision.reset_at, "rate limit exceeded");
        }
        decision
    }

    /// [`admit`](Self::admit), turning a rejection into [`PiaError::RateLimited`]
    pub fn check(&self, key: &str, now: DateTime<Utc>) -> Result<Decision> {
        let decision = self.admit(key, now);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(PiaError::RateLimited {
                reset_at: decision.reset_at,
            })
        }
    }

    /// Window state for `key` without counting a request
    pub fn stats(&self, key: &str, now: DateTime<Utc>) -> Decision {
        match self.store.get(key) {
            Some(state) if now < state.window_start + self.window => Decision {
                allowed: state.count < self.max_requests,
                remaining: self.max_requests.saturating_sub(state.count),
                reset_at: state.window_start + self.window,
            },
            _ => Decision {
                allowed: self.max_requests > 0,
                remaining: self.max_requests,
                reset_at: now + self.window,
            },
        }
    }

    /// Forget keys whose window has expired; returns how many were dropped
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let window = self.window;
        self.store
            .retain(&|state: &WindowState| now < state.window_start + window)
    }

    pub fn snapshot(&self) -> LimiterStats {
        LimiterStats {
            window_secs: self.window_secs,
            max_requests: self.max_requests,
            admitted_total: self.admitted.load(Ordering::Relaxed),
            rejected_total: self.rejected.load(Ordering::Relaxed),
            tracked_keys: self.store.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window_secs: 60,
            max_requests,
        })
    }

    #[test]
    fn test_exactly_n_admitted() {
        let limiter = limiter(3);
        let now = Utc::now();
        for expected_remaining in [2, 1, 0] {
            let d = limiter.admit("k", now);
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }
        let d = limiter.admit("k", now);
        assert!(!d.allowed);
        assert_eq!(d.reset_at, now + Duration::seconds(60));
    }

    #[test]
    fn test_window_rollover_restores_quota() {
        let limiter = limiter(2);
        let start = Utc::now();
        limiter.admit("k", start);
        limiter.admit("k", start);
        assert!(!limiter.admit("k", start + Duration::seconds(59)).allowed);

        let later = start + Duration::seconds(60);
        let d = limiter.admit("k", later);
        assert!(d.allowed);
        assert_eq!(d.remaining, 1);
        assert_eq!(d.reset_at, later + Duration::seconds(60));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1);
        let now = Utc::now();
        assert!(limiter.admit("a", now).allowed);
        assert!(!limiter.admit("a", now).allowed);
        assert!(limiter.admit("b", now).allowed);
    }

    #[test]
    fn test_stats_does_not_count() {
        let limiter = limiter(5);
        let now = Utc::now();
        assert_eq!(limiter.stats("k", now).remaining, 5);
        limiter.admit("k", now);
        assert_eq!(limiter.stats("k", now).remaining, 4);
        assert_eq!(limiter.stats("k", now).remaining, 4);
        assert_eq!(limiter.stats("k", now + Duration::seconds(61)).remaining, 5);
    }

    #[test]
    fn test_check_maps_to_error() {
        let limiter = limiter(0);
        let err = limiter.check("k", Utc::now()).unwrap_err();
        assert!(matches!(err, PiaError::RateLimited { .. }));
    }

    #[test]
    fn test_purge_expired() {
        let limiter = limiter(5);
        let start = Utc::now();
        limiter.admit("old", start);
        limiter.admit("new", start + Duration::seconds(50));

        assert_eq!(limiter.purge_expired(start + Duration::seconds(70)), 1);
        assert_eq!(limiter.snapshot().tracked_keys, 1);
    }

    #[test]
    fn test_counters() {
        let limiter = limiter(1);
        let now = Utc::now();
        limiter.admit("k", now);
        limiter.admit("k", now);
        limiter.admit("k", now);
        let stats = limiter.snapshot();
        assert_eq!(stats.admitted_total, 1);
        assert_eq!(stats.rejected_total, 2);
        assert_eq!(stats.max_requests, 1);
    }

    #[test]
    fn test_concurrent_admits_never_exceed_limit() {
        let limiter = Arc::new(limiter(30));
        let now = Utc::now();

        let allowed: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let limiter = Arc::clone(&limiter);
                    scope.spawn(move || {
                        (0..20)
                            .filter(|_| limiter.admit("shared", now).allowed)
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(allowed, 30);
    }
}

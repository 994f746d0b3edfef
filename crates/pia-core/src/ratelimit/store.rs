//! Storage for per-key window state

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Request count for one key within its current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl WindowState {
    pub fn new(window_start: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start,
        }
    }
}

/// Backing store for rate-limit windows.
///
/// `update` must give the closure exclusive access to the key's state for
/// the whole call, so a read-check-increment cannot interleave with another.
pub trait RateLimitStore: Send + Sync {
    /// Run `apply` on the state for `key`, creating it at `now` if absent
    fn update(&self, key: &str, now: DateTime<Utc>, apply: &mut dyn FnMut(&mut WindowState));

    /// Current state for `key` without creating it
    fn get(&self, key: &str) -> Option<WindowState>;

    /// Drop every entry for which `keep` is false; returns how many were dropped
    fn retain(&self, keep: &dyn Fn(&WindowState) -> bool) -> usize;

    /// Number of tracked keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    windows: DashMap<String, WindowState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryStore {
    fn update(&self, key: &str, now: DateTime<Utc>, apply: &mut dyn FnMut(&mut WindowState)) {
        // the entry guard holds the shard lock until dropped
        let mut state = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowState::new(now));
        apply(&mut state);
    }

    fn get(&self, key: &str) -> Option<WindowState> {
        self.windows.get(key).map(|state| *state)
    }

    fn retain(&self, keep: &dyn Fn(&WindowState) -> bool) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, state| keep(state));
        before.saturating_sub(self.windows.len())
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

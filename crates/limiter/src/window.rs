use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Quota and window duration for one limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Maximum admissions inside any trailing window.
    pub quota: u32,
    /// Trailing window duration.
    pub window: Duration,
}

impl LimiterSettings {
    pub fn new(quota: u32, window: Duration) -> Self {
        Self { quota, window }
    }
}

/// Refusal: how long until the oldest counted admission leaves the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAfter(pub Duration);

impl RetryAfter {
    /// Whole seconds, rounded up so a caller that waits exactly this long
    /// lands past the window edge.
    pub fn as_secs_ceil(&self) -> u64 {
        let millis = self.0.num_milliseconds().max(0) as u64;
        millis.div_ceil(1000)
    }
}

/// Per-key admission log inside the trailing window.
#[derive(Debug, Default)]
struct WindowLog {
    admissions: VecDeque<DateTime<Utc>>,
}

/// Sliding-window-log limiter.
///
/// A log policy rather than a fixed bucket: admission is smooth across any
/// rolling window of the configured duration, with no 2x burst at bucket
/// boundaries. Records are created lazily per key, evicted lazily on each
/// check, and prunable after prolonged inactivity.
pub struct SlidingWindowLimiter {
    settings: LimiterSettings,
    windows: DashMap<String, WindowLog>,
}

impl SlidingWindowLimiter {
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            settings,
            windows: DashMap::new(),
        }
    }

    pub fn settings(&self) -> LimiterSettings {
        self.settings
    }

    /// Admit or refuse one request for `key` at `now`.
    ///
    /// Evicts entries at or past the window edge, refuses when the remaining
    /// count meets the quota, and otherwise records `now` before returning:
    /// once admitted, the entry counts regardless of what the downstream
    /// does with the request. The map's entry guard serializes the
    /// evict-count-append sequence per key; concurrent bursts on one key
    /// cannot exceed the quota.
    pub fn check(&self, key: &str, now: DateTime<Utc>) -> Result<(), RetryAfter> {
        if self.settings.quota == 0 {
            return Err(RetryAfter(self.settings.window));
        }

        let mut entry = self.windows.entry(key.to_string()).or_default();
        let log = entry.value_mut();

        let cutoff = now - self.settings.window;
        while log.admissions.front().is_some_and(|t| *t <= cutoff) {
            log.admissions.pop_front();
        }

        if log.admissions.len() >= self.settings.quota as usize {
            // Oldest entry is present here: len >= quota >= 1.
            let oldest = *log.admissions.front().unwrap_or(&now);
            return Err(RetryAfter(self.settings.window - (now - oldest)));
        }

        log.admissions.push_back(now);
        Ok(())
    }

    /// Drop per-key records with no admission inside the last `max_idle`.
    ///
    /// Only records whose every entry already left the window are removed,
    /// so a pruned key re-created on its next request starts from an
    /// equivalent (empty) state.
    pub fn prune_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let cutoff = now - max_idle.max(self.settings.window);

        let stale: Vec<String> = self
            .windows
            .iter()
            .filter_map(|entry| {
                let newest = entry.value().admissions.back().copied();
                match newest {
                    None => Some(entry.key().clone()),
                    Some(t) if t <= cutoff => Some(entry.key().clone()),
                    Some(_) => None,
                }
            })
            .collect();

        let mut removed = 0;
        for key in stale {
            if self.windows.remove(&key).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

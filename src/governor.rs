//! Rate Governor: per-key cooldown and rolling hourly quota per detector.
//!
//! Both checks are pure gates. State only advances in
//! [`RateGovernor::record_emission`], so a rejected evaluation never moves a
//! cooldown or consumes quota.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::detector::SignalKind;
use crate::store::InsertionOrderCache;

/// Length of the quota window.
pub const HOUR_MS: i64 = 3_600_000;

/// Governor parameters.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Maximum emissions per detector in any rolling hour.
    pub max_signals_per_hour: usize,
    /// Maximum cooldown keys retained.
    pub cooldown_capacity: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_signals_per_hour: 60,
            cooldown_capacity: 50_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cooldown {
    emitted_ms: i64,
    cooldown_ms: i64,
}

/// Snapshot of governor state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorSnapshot {
    /// Cooldown keys currently tracked.
    pub cooldown_keys: usize,
    /// Emissions within the last hour, per detector.
    pub hourly: HashMap<SignalKind, usize>,
}

/// Shared cooldown and quota gate used by every detector.
#[derive(Debug)]
pub struct RateGovernor {
    config: GovernorConfig,
    cooldowns: InsertionOrderCache<String, Cooldown>,
    hourly: HashMap<SignalKind, VecDeque<i64>>,
}

impl RateGovernor {
    /// Create a governor.
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            cooldowns: InsertionOrderCache::new(config.cooldown_capacity),
            config,
            hourly: HashMap::new(),
        }
    }

    /// Whether `key` is outside its cooldown window at `now_ms`.
    pub fn check_cooldown(&self, key: &str, cooldown_ms: i64, now_ms: i64) -> bool {
        match self.cooldowns.get(key) {
            Some(last) => now_ms - last.emitted_ms >= cooldown_ms,
            None => true,
        }
    }

    /// Whether `scope` has quota left in the rolling hour ending at `now_ms`.
    pub fn check_hourly_quota(&self, scope: SignalKind, now_ms: i64) -> bool {
        self.emissions_in_window(scope, now_ms) < self.config.max_signals_per_hour
    }

    /// Record an emission: stamps the cooldown key and consumes quota.
    pub fn record_emission(&mut self, scope: SignalKind, key: &str, cooldown_ms: i64, now_ms: i64) {
        let cooldown = Cooldown {
            emitted_ms: now_ms,
            cooldown_ms,
        };
        // Re-insert so a refreshed key moves to the back of the eviction order.
        self.cooldowns.remove(key);
        self.cooldowns.insert(key.to_string(), cooldown);

        let queue = self.hourly.entry(scope).or_default();
        while queue.front().is_some_and(|&ts| now_ms - ts >= HOUR_MS) {
            queue.pop_front();
        }
        queue.push_back(now_ms);
    }

    /// Emissions by `scope` within the rolling hour ending at `now_ms`.
    pub fn emissions_in_window(&self, scope: SignalKind, now_ms: i64) -> usize {
        self.hourly
            .get(&scope)
            .map(|queue| queue.iter().filter(|&&ts| now_ms - ts < HOUR_MS).count())
            .unwrap_or(0)
    }

    /// Drop expired cooldowns and hour-old quota entries. Returns removed keys.
    pub fn sweep(&mut self, now_ms: i64) -> usize {
        let removed = self
            .cooldowns
            .remove_where(|_, c| now_ms - c.emitted_ms >= c.cooldown_ms)
            .len();
        for queue in self.hourly.values_mut() {
            while queue.front().is_some_and(|&ts| now_ms - ts >= HOUR_MS) {
                queue.pop_front();
            }
        }
        self.hourly.retain(|_, queue| !queue.is_empty());
        removed
    }

    /// Current state for dashboards.
    pub fn snapshot(&self, now_ms: i64) -> GovernorSnapshot {
        GovernorSnapshot {
            cooldown_keys: self.cooldowns.len(),
            hourly: self
                .hourly
                .keys()
                .map(|&kind| (kind, self.emissions_in_window(kind, now_ms)))
                .collect(),
        }
    }
}

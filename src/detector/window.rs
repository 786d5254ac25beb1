//! Time-ordered sample series for window and lookback comparisons.

use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::store::InsertionOrderCache;

/// Hard cap on samples per series.
const MAX_SAMPLES: usize = 512;

/// Samples kept for `retention_ms`, plus the newest sample older than that
/// so a lookback at exactly the retention edge still has a baseline.
#[derive(Debug, Clone)]
pub struct RollingSeries {
    retention_ms: i64,
    samples: VecDeque<(i64, Decimal)>,
}

impl RollingSeries {
    /// Create an empty series.
    pub fn new(retention_ms: i64) -> Self {
        Self {
            retention_ms,
            samples: VecDeque::new(),
        }
    }

    /// Append a sample. Samples older than the latest are ignored.
    pub fn push(&mut self, timestamp_ms: i64, value: Decimal) {
        if self
            .samples
            .back()
            .is_some_and(|&(last, _)| timestamp_ms < last)
        {
            return;
        }
        self.samples.push_back((timestamp_ms, value));

        let cutoff = timestamp_ms - self.retention_ms;
        while self.samples.len() >= 2 && self.samples[1].0 <= cutoff {
            self.samples.pop_front();
        }
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// Latest sample.
    pub fn latest(&self) -> Option<(i64, Decimal)> {
        self.samples.back().copied()
    }

    /// Oldest sample taken at or after `since_ms`.
    pub fn oldest_since(&self, since_ms: i64) -> Option<(i64, Decimal)> {
        self.samples.iter().find(|&&(ts, _)| ts >= since_ms).copied()
    }

    /// Newest sample taken at or before `at_ms`.
    pub fn value_at_or_before(&self, at_ms: i64) -> Option<(i64, Decimal)> {
        self.samples.iter().rev().find(|&&(ts, _)| ts <= at_ms).copied()
    }

    /// Sample roughly `lookback_ms` before `now_ms`: the newest one at or
    /// before that point, rejected once it is more than two lookbacks old.
    pub fn baseline(&self, now_ms: i64, lookback_ms: i64) -> Option<(i64, Decimal)> {
        self.value_at_or_before(now_ms - lookback_ms)
            .filter(|&(ts, _)| now_ms - ts <= 2 * lookback_ms)
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the series is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One [`RollingSeries`] per key, bounded in key count.
#[derive(Debug)]
pub struct SeriesMap {
    retention_ms: i64,
    series: InsertionOrderCache<String, RollingSeries>,
}

impl SeriesMap {
    /// Create an empty map of series retaining `retention_ms` each.
    pub fn new(retention_ms: i64, max_keys: usize) -> Self {
        Self {
            retention_ms,
            series: InsertionOrderCache::new(max_keys),
        }
    }

    /// Append a sample to `key`'s series, creating it when missing.
    pub fn push(&mut self, key: &str, timestamp_ms: i64, value: Decimal) -> Option<&RollingSeries> {
        if !self.series.contains_key(key) {
            self.series
                .insert(key.to_string(), RollingSeries::new(self.retention_ms));
        }
        let series = self.series.get_mut(key)?;
        series.push(timestamp_ms, value);
        Some(series)
    }

    /// Restart `key`'s series from its latest sample.
    pub fn reset_to_latest(&mut self, key: &str) {
        if let Some(series) = self.series.get_mut(key) {
            if let Some((ts, value)) = series.latest() {
                series.clear();
                series.push(ts, value);
            }
        }
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn keeps_one_sample_past_retention() {
        let mut series = RollingSeries::new(60_000);
        series.push(0, dec!(100));
        series.push(30_000, dec!(90));
        series.push(100_000, dec!(80));

        // The 0ms sample is dropped; 30s remains as the baseline at 40s.
        assert_eq!(series.len(), 2);
        assert_eq!(series.value_at_or_before(10_000), None);
        assert_eq!(series.value_at_or_before(40_000), Some((30_000, dec!(90))));
    }

    #[test]
    fn baseline_rejects_samples_from_long_ago() {
        let mut series = RollingSeries::new(60_000);
        series.push(0, dec!(100));
        series.push(110_000, dec!(90));

        assert_eq!(series.baseline(110_000, 60_000), Some((0, dec!(100))));
        series.push(3_600_000, dec!(80));
        // Only the 110s sample precedes the minute mark, and it is an hour old.
        assert_eq!(series.value_at_or_before(3_540_000), Some((110_000, dec!(90))));
        assert_eq!(series.baseline(3_600_000, 60_000), None);
    }

    #[test]
    fn oldest_since_skips_samples_before_window() {
        let mut series = RollingSeries::new(300_000);
        series.push(0, dec!(0.40));
        series.push(100_000, dec!(0.42));
        series.push(200_000, dec!(0.50));

        assert_eq!(series.oldest_since(50_000), Some((100_000, dec!(0.42))));
        assert_eq!(series.latest(), Some((200_000, dec!(0.50))));
    }

    #[test]
    fn out_of_order_samples_are_ignored() {
        let mut series = RollingSeries::new(1_000);
        series.push(500, dec!(1));
        series.push(400, dec!(2));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn series_map_resets_to_latest() {
        let mut map = SeriesMap::new(60_000, 2);
        map.push("a", 0, dec!(1));
        map.push("a", 1_000, dec!(2));
        map.reset_to_latest("a");
        let series = map.push("a", 2_000, dec!(3)).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.value_at_or_before(1_500), Some((1_000, dec!(2))));

        map.push("b", 0, dec!(1));
        map.push("c", 0, dec!(1));
        assert_eq!(map.len(), 2);
    }
}

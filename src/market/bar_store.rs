use crate::error::TraderError;
use crate::models::Bar;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// What `BarStore::append` did with a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Bar extended the series
    Inserted,
    /// Bar carried the latest timestamp and overwrote the stored bar
    Replaced,
}

/// In-memory buffer of market bars for a single symbol
///
/// Maintains a rolling window of the most recent `capacity` bars, unique by
/// timestamp and ordered oldest first. Owned by the trading worker, so no
/// locking.
#[derive(Debug, Clone)]
pub struct BarStore {
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl BarStore {
    /// Create a new bar store
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of bars to keep
    pub fn new(capacity: usize) -> Self {
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a bar
    ///
    /// A bar with the latest timestamp replaces it (the forming bar is
    /// refreshed every tick). Bars older than the latest are rejected with
    /// `DataGap`. If the buffer is full, removes the oldest bar.
    pub fn append(&mut self, bar: Bar) -> Result<AppendOutcome, TraderError> {
        let outcome = match self.latest_timestamp() {
            Some(latest) if bar.timestamp < latest => {
                return Err(TraderError::DataGap {
                    timestamp: bar.timestamp,
                    latest,
                });
            }
            Some(latest) if bar.timestamp == latest => {
                if let Some(stored) = self.bars.back_mut() {
                    *stored = bar;
                }
                AppendOutcome::Replaced
            }
            _ => {
                self.bars.push_back(bar);
                AppendOutcome::Inserted
            }
        };

        // Remove oldest if exceeds max
        while self.bars.len() > self.capacity {
            self.bars.pop_front();
        }

        Ok(outcome)
    }

    /// Append a batch of historical bars, sorted and deduplicated first
    ///
    /// Returns how many bars were rejected as out of order.
    pub fn extend(&mut self, mut bars: Vec<Bar>) -> usize {
        bars.sort_by_key(|b| b.timestamp);

        let mut rejected = 0;
        for bar in bars {
            if self.append(bar).is_err() {
                rejected += 1;
            }
        }
        rejected
    }

    /// Ordered copy of every stored bar
    pub fn snapshot(&self) -> Vec<Bar> {
        self.bars.iter().cloned().collect()
    }

    /// Get the N most recent bars
    pub fn recent(&self, n: usize) -> Vec<Bar> {
        self.bars.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.back().map(|b| b.timestamp)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn create_test_bar(minute: i64, price: f64) -> Bar {
        Bar {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(minute),
            open: price,
            high: price,
            low: price,
            close: price,
            tick_volume: 1000.0,
        }
    }

    #[test]
    fn test_new_store() {
        let store = BarStore::new(100);
        assert_eq!(store.capacity(), 100);
        assert!(store.is_empty());
        assert!(store.latest().is_none());
    }

    #[test]
    fn test_append_bar() {
        let mut store = BarStore::new(100);

        let outcome = store.append(create_test_bar(1, 100.0)).unwrap();
        assert_eq!(outcome, AppendOutcome::Inserted);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_keeps_most_recent() {
        let mut store = BarStore::new(3);

        for t in 1..=4 {
            store.append(create_test_bar(t, 100.0 + t as f64)).unwrap();
        }

        let bars = store.snapshot();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn test_duplicate_timestamp_replaces() {
        let mut store = BarStore::new(10);

        store.append(create_test_bar(1, 100.0)).unwrap();
        store.append(create_test_bar(2, 101.0)).unwrap();
        let outcome = store.append(create_test_bar(2, 101.5)).unwrap();

        assert_eq!(outcome, AppendOutcome::Replaced);
        assert_eq!(store.len(), 2);
        assert_eq!(store.latest().unwrap().close, 101.5);
    }

    #[test]
    fn test_older_bar_is_rejected() {
        let mut store = BarStore::new(10);

        store.append(create_test_bar(5, 100.0)).unwrap();
        let result = store.append(create_test_bar(3, 99.0));

        assert!(matches!(result, Err(TraderError::DataGap { .. })));
        assert_eq!(store.len(), 1);
        assert_eq!(store.latest().unwrap().close, 100.0);
    }

    #[test]
    fn test_never_holds_duplicates_or_exceeds_capacity() {
        let mut store = BarStore::new(5);
        // Mix of new, repeated and stale timestamps
        let minutes = [1, 2, 2, 3, 1, 4, 4, 5, 6, 3, 7, 8, 8, 9];

        for (i, &m) in minutes.iter().enumerate() {
            let _ = store.append(create_test_bar(m, i as f64));
            assert!(store.len() <= 5);

            let bars = store.snapshot();
            for pair in bars.windows(2) {
                assert!(pair[0].timestamp < pair[1].timestamp);
            }
        }
    }

    #[test]
    fn test_extend_sorts_history() {
        let mut store = BarStore::new(10);

        let rejected = store.extend(vec![
            create_test_bar(3, 103.0),
            create_test_bar(1, 101.0),
            create_test_bar(2, 102.0),
            create_test_bar(2, 102.5),
        ]);

        assert_eq!(rejected, 0);
        let closes: Vec<f64> = store.snapshot().iter().map(|b| b.close).collect();
        assert_eq!(closes.len(), 3);
        assert_eq!(closes[0], 101.0);
        assert_eq!(closes[2], 103.0);
    }

    #[test]
    fn test_recent() {
        let mut store = BarStore::new(100);

        for i in 0..10 {
            store.append(create_test_bar(i, 100.0 + i as f64)).unwrap();
        }

        let recent = store.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].close, 107.0); // Last 3: 107, 108, 109
        assert_eq!(recent[2].close, 109.0);
    }

    #[test]
    fn test_clear() {
        let mut store = BarStore::new(100);
        store.append(create_test_bar(1, 100.0)).unwrap();

        store.clear();

        assert!(store.is_empty());
        assert!(store.latest_timestamp().is_none());
    }
}

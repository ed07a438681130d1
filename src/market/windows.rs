use crate::models::Bar;
use chrono::Duration;

/// Number of values in one feature row (open, high, low, close, tick volume)
pub const FEATURES_PER_BAR: usize = 5;

/// W consecutive bars' feature rows, optionally paired with the next bar's close
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    pub rows: Vec<[f64; FEATURES_PER_BAR]>,
    /// Close of the bar following the window (raw price, `None` for inference)
    pub label: Option<f64>,
}

impl FeatureWindow {
    fn from_bars(bars: &[Bar], label: Option<f64>) -> Self {
        Self {
            rows: bars.iter().map(Bar::features).collect(),
            label,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Close price of the newest bar in the window
    pub fn last_close(&self) -> Option<f64> {
        self.rows.last().map(|row| row[3])
    }
}

/// Slices bar history into fixed-length supervised-learning windows
#[derive(Debug, Clone, Copy)]
pub struct WindowBuilder {
    window: usize,
    max_gap: Option<Duration>,
}

impl WindowBuilder {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            max_gap: None,
        }
    }

    /// Skip windows whose bars are spaced further apart than `max_gap`
    pub fn with_max_gap(mut self, max_gap: Duration) -> Self {
        self.max_gap = Some(max_gap);
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Every (window, label) pair with W+1 contiguous bars, oldest first
    ///
    /// Yields nothing when fewer than W+1 bars are available.
    pub fn build<'a>(&self, bars: &'a [Bar]) -> impl Iterator<Item = FeatureWindow> + 'a {
        let window = self.window;
        let max_gap = self.max_gap;
        let starts = if window == 0 {
            0
        } else {
            bars.len().saturating_sub(window)
        };

        (0..starts)
            .map(move |start| &bars[start..start + window + 1])
            .filter(move |span| is_contiguous(span, max_gap))
            .map(move |span| FeatureWindow::from_bars(&span[..window], Some(span[window].close)))
    }

    /// The most recent W bars as an unlabelled inference window
    ///
    /// `None` until W+1 bars of history exist, or when the newest bars span a gap.
    pub fn latest(&self, bars: &[Bar]) -> Option<FeatureWindow> {
        if self.window == 0 || bars.len() < self.window + 1 {
            return None;
        }

        let span = &bars[bars.len() - self.window..];
        if !is_contiguous(span, self.max_gap) {
            return None;
        }

        Some(FeatureWindow::from_bars(span, None))
    }
}

/// True when consecutive bars are strictly increasing in time and no further
/// apart than `max_gap`
pub fn is_contiguous(bars: &[Bar], max_gap: Option<Duration>) -> bool {
    bars.windows(2).all(|pair| {
        let diff = pair[1].timestamp - pair[0].timestamp;
        diff > Duration::zero() && max_gap.map_or(true, |gap| diff <= gap)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars_at(minutes: &[i64]) -> Vec<Bar> {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        minutes
            .iter()
            .map(|&m| Bar {
                timestamp: base + Duration::minutes(m),
                open: m as f64,
                high: m as f64 + 0.5,
                low: m as f64 - 0.5,
                close: m as f64 * 10.0,
                tick_volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn test_latest_uses_most_recent_bars() {
        let bars = bars_at(&[1, 2, 3, 4, 5]);
        let builder = WindowBuilder::new(2);

        let window = builder.latest(&bars).unwrap();

        assert_eq!(window.len(), 2);
        assert_eq!(window.rows[0][0], 4.0);
        assert_eq!(window.rows[1][0], 5.0);
        assert_eq!(window.label, None);
        assert_eq!(window.last_close(), Some(50.0));
    }

    #[test]
    fn test_build_labels_with_next_close() {
        let bars = bars_at(&[1, 2, 3, 4, 5]);
        let builder = WindowBuilder::new(2);

        let windows: Vec<FeatureWindow> = builder.build(&bars).collect();

        // Starts at t=1, 2, 3; each needs 3 bars
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].rows[0][0], 1.0);
        assert_eq!(windows[0].label, Some(30.0));
        assert_eq!(windows[2].rows[1][0], 4.0);
        assert_eq!(windows[2].label, Some(50.0));
    }

    #[test]
    fn test_not_enough_history() {
        let bars = bars_at(&[1, 2]);
        let builder = WindowBuilder::new(2);

        assert_eq!(builder.build(&bars).count(), 0);
        assert!(builder.latest(&bars).is_none());
        assert!(builder.latest(&[]).is_none());
    }

    #[test]
    fn test_windows_spanning_gap_are_skipped() {
        // 10 minute hole between t=3 and t=13
        let bars = bars_at(&[1, 2, 3, 13, 14, 15]);
        let builder = WindowBuilder::new(2).with_max_gap(Duration::seconds(90));

        let windows: Vec<FeatureWindow> = builder.build(&bars).collect();

        // Only [1,2]->3 and [13,14]->15 stay clear of the hole
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].label, Some(30.0));
        assert_eq!(windows[1].label, Some(150.0));
        assert!(builder.latest(&bars).is_some());
    }

    #[test]
    fn test_latest_none_when_recent_bars_gapped() {
        let bars = bars_at(&[1, 2, 3, 10]);
        let builder = WindowBuilder::new(2).with_max_gap(Duration::seconds(90));

        assert!(builder.latest(&bars).is_none());
        // Without a gap limit the store order is enough
        assert!(WindowBuilder::new(2).latest(&bars).is_some());
    }

    #[test]
    fn test_is_contiguous() {
        let bars = bars_at(&[1, 2, 3]);
        assert!(is_contiguous(&bars, Some(Duration::seconds(60))));
        assert!(!is_contiguous(&bars, Some(Duration::seconds(30))));
        assert!(is_contiguous(&bars[..1], Some(Duration::seconds(1))));
    }
}

use analysis_core::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

/// A confirmed swing point. Cheap to recompute; derived from the bar window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub kind: SwingKind,
    /// Half-window length that confirmed this swing.
    pub strength: usize,
}

/// Find swing highs and lows with a strict half-window comparison.
///
/// A bar at index i is a swing high iff its high is strictly greater than
/// every high in [i-w, i-1] and [i+1, i+w]. Edge bars cannot be swings.
pub fn find_swing_points(bars: &[Bar], w: usize) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if bars.len() < w * 2 + 1 {
        return (highs, lows);
    }

    for i in w..bars.len() - w {
        let current_high = bars[i].high;
        let current_low = bars[i].low;

        let is_swing_high = bars[i - w..i]
            .iter()
            .chain(&bars[i + 1..=i + w])
            .all(|b| b.high < current_high);
        if is_swing_high {
            highs.push(SwingPoint {
                index: i,
                timestamp: bars[i].timestamp,
                price: current_high,
                kind: SwingKind::High,
                strength: w,
            });
        }

        let is_swing_low = bars[i - w..i]
            .iter()
            .chain(&bars[i + 1..=i + w])
            .all(|b| b.low > current_low);
        if is_swing_low {
            lows.push(SwingPoint {
                index: i,
                timestamp: bars[i].timestamp,
                price: current_low,
                kind: SwingKind::Low,
                strength: w,
            });
        }
    }

    (highs, lows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trend::test_support::series_from_closes;

    #[test]
    fn detects_isolated_peak_and_trough() {
        // Flat series with one spike up at 10 and one dip at 20.
        let mut closes = vec![1.1000; 31];
        closes[10] = 1.1050;
        closes[20] = 1.0950;
        let bars = series_from_closes(&closes);

        let (highs, lows) = find_swing_points(&bars, 5);
        assert_eq!(highs.iter().map(|s| s.index).collect::<Vec<_>>(), vec![10]);
        assert_eq!(lows.iter().map(|s| s.index).collect::<Vec<_>>(), vec![20]);
        assert_eq!(highs[0].strength, 5);
    }

    #[test]
    fn edge_bars_are_never_swings() {
        let mut closes = vec![1.1000; 20];
        closes[0] = 1.2000; // extreme but inside the edge margin
        closes[19] = 1.0500;
        let bars = series_from_closes(&closes);

        let (highs, lows) = find_swing_points(&bars, 5);
        assert!(highs.iter().all(|s| s.index >= 5 && s.index < 15));
        assert!(lows.iter().all(|s| s.index >= 5 && s.index < 15));
    }

    #[test]
    fn equal_highs_do_not_confirm_a_swing() {
        // Two identical peaks inside one window: strict comparison fails both.
        let mut closes = vec![1.1000; 25];
        closes[10] = 1.1050;
        closes[12] = 1.1050;
        let bars = series_from_closes(&closes);

        let (highs, _) = find_swing_points(&bars, 5);
        assert!(highs.is_empty());
    }
}

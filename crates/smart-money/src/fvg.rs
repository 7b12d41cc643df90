use analysis_core::{price_to_pips, Bar};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FvgKind {
    Bullish,
    Bearish,
}

/// A three-bar imbalance: the middle bar leaves a price range untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairValueGap {
    /// Timestamp of the middle bar of the three-bar pattern.
    pub timestamp: DateTime<Utc>,
    /// Bar index at which the gap is confirmed (third bar).
    pub index: usize,
    pub kind: FvgKind,
    pub top: f64,
    pub bottom: f64,
    pub size_pips: f64,
    /// Fraction of the gap filled by subsequent price action, 0..=100.
    pub mitigation_percent: f64,
}

impl FairValueGap {
    pub fn is_active(&self) -> bool {
        self.mitigation_percent < 100.0
    }
}

/// Detect fair value gaps and their current mitigation level.
///
/// Bullish at bar i when low[i] > high[i-2]; bearish when high[i] < low[i-2].
/// Gaps smaller than `min_size_pips` are discarded. Mitigation is the share
/// of the gap range revisited by later bars, capped at 100; it can only grow
/// as bars are appended.
pub fn detect_fair_value_gaps(bars: &[Bar], min_size_pips: f64) -> Vec<FairValueGap> {
    let mut fvgs = Vec::new();

    for i in 2..bars.len() {
        let prev_high = bars[i - 2].high;
        let prev_low = bars[i - 2].low;
        let curr = &bars[i];

        if curr.low > prev_high {
            let size_pips = price_to_pips(curr.low - prev_high);
            if size_pips >= min_size_pips {
                fvgs.push(FairValueGap {
                    timestamp: bars[i - 1].timestamp,
                    index: i,
                    kind: FvgKind::Bullish,
                    top: curr.low,
                    bottom: prev_high,
                    size_pips,
                    mitigation_percent: 0.0,
                });
            }
        }

        if curr.high < prev_low {
            let size_pips = price_to_pips(prev_low - curr.high);
            if size_pips >= min_size_pips {
                fvgs.push(FairValueGap {
                    timestamp: bars[i - 1].timestamp,
                    index: i,
                    kind: FvgKind::Bearish,
                    top: prev_low,
                    bottom: curr.high,
                    size_pips,
                    mitigation_percent: 0.0,
                });
            }
        }
    }

    for fvg in &mut fvgs {
        let future = &bars[fvg.index + 1..];
        let size = fvg.top - fvg.bottom;
        if size <= 0.0 {
            continue;
        }

        let mitigated = match fvg.kind {
            FvgKind::Bullish => future
                .iter()
                .filter(|b| b.low < fvg.top)
                .map(|b| fvg.top - b.low.max(fvg.bottom))
                .fold(0.0, f64::max),
            FvgKind::Bearish => future
                .iter()
                .filter(|b| b.high > fvg.bottom)
                .map(|b| b.high.min(fvg.top) - fvg.bottom)
                .fold(0.0, f64::max),
        };
        fvg.mitigation_percent = (mitigated / size * 100.0).min(100.0);
    }

    fvgs
}

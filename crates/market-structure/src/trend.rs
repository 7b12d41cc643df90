use analysis_core::TrendDirection;

use crate::swings::SwingPoint;

/// Classify the trend from the most recent swing points.
///
/// Uses the last <=5 swings of each kind and requires at least 3 of each.
/// A "2-of-3" progression test keeps the classification tolerant of one
/// irregular swing: uptrend when at least one of the last two high-to-high
/// steps rises AND at least one low-to-low step rises; downtrend symmetric.
pub fn identify_trend(swing_highs: &[SwingPoint], swing_lows: &[SwingPoint]) -> TrendDirection {
    let highs = recent_prices(swing_highs, 5);
    let lows = recent_prices(swing_lows, 5);

    if highs.len() < 3 || lows.len() < 3 {
        return TrendDirection::Consolidation;
    }

    let (h, l) = (&highs[highs.len() - 3..], &lows[lows.len() - 3..]);

    let higher_highs = (h[2] > h[1]) as u32 + (h[1] > h[0]) as u32;
    let higher_lows = (l[2] > l[1]) as u32 + (l[1] > l[0]) as u32;
    if higher_highs >= 1 && higher_lows >= 1 {
        return TrendDirection::Uptrend;
    }

    let lower_highs = (h[2] < h[1]) as u32 + (h[1] < h[0]) as u32;
    let lower_lows = (l[2] < l[1]) as u32 + (l[1] < l[0]) as u32;
    if lower_highs >= 1 && lower_lows >= 1 {
        return TrendDirection::Downtrend;
    }

    TrendDirection::Consolidation
}

/// Trend strength: 0.8 for a full three-point progression, 0.6 for a
/// partial one, 0.7 when there are too few swings to grade, 0.0 in
/// consolidation.
pub fn trend_strength(
    trend: TrendDirection,
    swing_highs: &[SwingPoint],
    swing_lows: &[SwingPoint],
) -> f64 {
    if trend == TrendDirection::Consolidation {
        return 0.0;
    }

    let highs = recent_prices(swing_highs, 3);
    let lows = recent_prices(swing_lows, 3);
    if highs.len() < 3 || lows.len() < 3 {
        return 0.7;
    }

    let full_progression = match trend {
        TrendDirection::Uptrend => {
            highs[2] > highs[1] && highs[1] > highs[0] && lows[2] > lows[1] && lows[1] > lows[0]
        }
        TrendDirection::Downtrend => {
            highs[2] < highs[1] && highs[1] < highs[0] && lows[2] < lows[1] && lows[1] < lows[0]
        }
        TrendDirection::Consolidation => false,
    };

    if full_progression {
        0.8
    } else {
        0.6
    }
}

fn recent_prices(swings: &[SwingPoint], n: usize) -> Vec<f64> {
    let start = swings.len().saturating_sub(n);
    swings[start..].iter().map(|s| s.price).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use analysis_core::Bar;
    use chrono::{Duration, TimeZone, Utc};

    /// Build an H1 bar series from closes with a fixed 3-pip wick each side.
    pub fn series_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::hours(i as i64),
                open: close - 0.0001,
                high: close + 0.0003,
                low: close - 0.0003,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    /// Bars tracing a zig-zag through the given pivot closes, `step` bars apart.
    pub fn zigzag_series(pivots: &[f64], step: usize) -> Vec<Bar> {
        let mut closes = Vec::new();
        for pair in pivots.windows(2) {
            for k in 0..step {
                let t = k as f64 / step as f64;
                closes.push(pair[0] + (pair[1] - pair[0]) * t);
            }
        }
        closes.push(*pivots.last().unwrap());
        series_from_closes(&closes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swings::{find_swing_points, SwingKind};
    use analysis_core::TrendDirection;
    use chrono::{TimeZone, Utc};

    fn swing(price: f64, kind: SwingKind, index: usize) -> SwingPoint {
        SwingPoint {
            index,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 8, index as u32 % 24, 0, 0).unwrap(),
            price,
            kind,
            strength: 10,
        }
    }

    fn swings(prices: &[f64], kind: SwingKind) -> Vec<SwingPoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| swing(p, kind, i * 10))
            .collect()
    }

    #[test]
    fn higher_highs_and_lows_mean_uptrend() {
        let highs = swings(&[1.10, 1.11, 1.12], SwingKind::High);
        let lows = swings(&[1.09, 1.095, 1.105], SwingKind::Low);
        assert_eq!(identify_trend(&highs, &lows), TrendDirection::Uptrend);
        assert_eq!(trend_strength(TrendDirection::Uptrend, &highs, &lows), 0.8);
    }

    #[test]
    fn partial_progression_still_trends_but_weaker() {
        // One lower high breaks the full progression; 2-of-3 still passes.
        let highs = swings(&[1.10, 1.12, 1.115], SwingKind::High);
        let lows = swings(&[1.09, 1.095, 1.105], SwingKind::Low);
        assert_eq!(identify_trend(&highs, &lows), TrendDirection::Uptrend);
        assert_eq!(trend_strength(TrendDirection::Uptrend, &highs, &lows), 0.6);
    }

    #[test]
    fn lower_highs_and_lows_mean_downtrend() {
        let highs = swings(&[1.12, 1.11, 1.10], SwingKind::High);
        let lows = swings(&[1.105, 1.095, 1.09], SwingKind::Low);
        assert_eq!(identify_trend(&highs, &lows), TrendDirection::Downtrend);
        assert_eq!(trend_strength(TrendDirection::Downtrend, &highs, &lows), 0.8);
    }

    #[test]
    fn too_few_swings_is_consolidation() {
        let highs = swings(&[1.10, 1.11], SwingKind::High);
        let lows = swings(&[1.09, 1.095, 1.10], SwingKind::Low);
        assert_eq!(identify_trend(&highs, &lows), TrendDirection::Consolidation);
        assert_eq!(
            trend_strength(TrendDirection::Consolidation, &highs, &lows),
            0.0
        );
    }

    #[test]
    fn mixed_swings_are_consolidation() {
        // Highs rise while lows fall: neither rule fires cleanly.
        let highs = swings(&[1.10, 1.11, 1.12], SwingKind::High);
        let lows = swings(&[1.10, 1.095, 1.09], SwingKind::Low);
        assert_eq!(identify_trend(&highs, &lows), TrendDirection::Consolidation);
    }

    #[test]
    fn zigzag_uptrend_classifies_from_raw_bars() {
        let bars = test_support::zigzag_series(
            &[1.1000, 1.1080, 1.1040, 1.1120, 1.1080, 1.1160, 1.1120, 1.1200],
            12,
        );
        let (highs, lows) = find_swing_points(&bars, 5);
        assert!(highs.len() >= 3 && lows.len() >= 3);
        assert_eq!(identify_trend(&highs, &lows), TrendDirection::Uptrend);
    }
}

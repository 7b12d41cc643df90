use analysis_core::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquiditySide {
    High,
    Low,
}

/// A price level with clustered resting stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub timestamp: DateTime<Utc>,
    pub index: usize,
    pub side: LiquiditySide,
    pub level: f64,
    pub touches: usize,
    pub strength: f64,
    pub distance_from_price: f64,
    /// One-way: once swept, a zone never reverts.
    pub swept: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPattern {
    LiquidityGrab,
    StopLossRaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    High,
    Low,
    EqualHighs,
    EqualLows,
}

impl SweepKind {
    pub fn side(&self) -> LiquiditySide {
        match self {
            SweepKind::High | SweepKind::EqualHighs => LiquiditySide::High,
            SweepKind::Low | SweepKind::EqualLows => LiquiditySide::Low,
        }
    }
}

/// A breach of a liquidity level followed by a reversal through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sweep {
    pub timestamp: DateTime<Utc>,
    pub pattern: SweepPattern,
    pub kind: SweepKind,
    pub level: f64,
    pub sweep_strength: f64,
    pub reversal_strength: f64,
    pub manipulation_score: f64,
}

/// Detect liquidity zones: levels with repeated touches in the last 100
/// bars, close to the current price. Pruned per side to the 3 nearest
/// unswept plus 3 nearest swept zones.
pub fn detect_liquidity_zones(bars: &[Bar], threshold: f64) -> Vec<LiquidityZone> {
    let mut zones = Vec::new();
    if bars.len() < 35 {
        return zones;
    }
    let current_price = bars[bars.len() - 1].close;
    let recent_start = bars.len().saturating_sub(100);

    for i in recent_start + 20..bars.len() - 10 {
        let current_high = bars[i].high;
        let current_low = bars[i].low;

        let window = &bars[i.saturating_sub(5)..(i + 5).min(bars.len())];
        let high_touches = window
            .iter()
            .filter(|b| (b.high - current_high).abs() <= current_high * threshold)
            .count();
        let low_touches = window
            .iter()
            .filter(|b| (b.low - current_low).abs() <= current_low * threshold)
            .count();

        let dist_high = (current_high - current_price).abs() / current_price;
        let dist_low = (current_low - current_price).abs() / current_price;
        let max_distance = 0.03;

        if high_touches >= 3 && dist_high <= max_distance {
            zones.push(LiquidityZone {
                timestamp: bars[i].timestamp,
                index: i,
                side: LiquiditySide::High,
                level: current_high,
                touches: high_touches,
                strength: high_touches as f64 / 10.0,
                distance_from_price: dist_high,
                swept: false,
            });
        }
        if low_touches >= 3 && dist_low <= max_distance {
            zones.push(LiquidityZone {
                timestamp: bars[i].timestamp,
                index: i,
                side: LiquiditySide::Low,
                level: current_low,
                touches: low_touches,
                strength: low_touches as f64 / 10.0,
                distance_from_price: dist_low,
                swept: false,
            });
        }
    }

    for zone in &mut zones {
        let future = &bars[zone.index + 1..];
        zone.swept = match zone.side {
            LiquiditySide::High => future.iter().any(|b| b.high > zone.level),
            LiquiditySide::Low => future.iter().any(|b| b.low < zone.level),
        };
    }

    prune_zones(zones)
}

/// Per side, keep the 3 nearest unswept and 3 nearest swept zones.
fn prune_zones(zones: Vec<LiquidityZone>) -> Vec<LiquidityZone> {
    let mut pruned = Vec::new();
    for side in [LiquiditySide::High, LiquiditySide::Low] {
        for swept in [false, true] {
            let mut group: Vec<LiquidityZone> = zones
                .iter()
                .filter(|z| z.side == side && z.swept == swept)
                .cloned()
                .collect();
            group.sort_by(|a, b| {
                a.distance_from_price
                    .partial_cmp(&b.distance_from_price)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            pruned.extend(group.into_iter().take(3));
        }
    }
    pruned
}

/// A cluster of equal swing highs or lows: a prime sweep target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EqualLevel {
    pub level: f64,
    pub side: LiquiditySide,
    pub occurrences: Vec<usize>,
    pub strength: usize,
}

/// Find equal highs/lows: swing extremes that match within `tolerance`
/// (relative) at least twice.
pub fn find_equal_levels(bars: &[Bar], tolerance: f64) -> Vec<EqualLevel> {
    let lookback = 5usize;
    let mut highs: Vec<(usize, f64)> = Vec::new();
    let mut lows: Vec<(usize, f64)> = Vec::new();

    if bars.len() < lookback * 2 + 1 {
        return Vec::new();
    }

    for i in lookback..bars.len() - lookback {
        let h = bars[i].high;
        let l = bars[i].low;
        let window = bars[i - lookback..=i + lookback]
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != lookback);
        let mut is_high = true;
        let mut is_low = true;
        for (_, b) in window {
            if b.high >= h {
                is_high = false;
            }
            if b.low <= l {
                is_low = false;
            }
        }
        if is_high {
            highs.push((i, h));
        }
        if is_low {
            lows.push((i, l));
        }
    }

    let mut levels = Vec::new();
    group_equal(&highs, tolerance, LiquiditySide::High, &mut levels);
    group_equal(&lows, tolerance, LiquiditySide::Low, &mut levels);
    levels
}

fn group_equal(
    points: &[(usize, f64)],
    tolerance: f64,
    side: LiquiditySide,
    out: &mut Vec<EqualLevel>,
) {
    for (i, &(base_idx, base_price)) in points.iter().enumerate() {
        let mut occurrences = vec![base_idx];
        for &(idx, price) in &points[i + 1..] {
            if (price - base_price).abs() / base_price <= tolerance {
                occurrences.push(idx);
            }
        }
        if occurrences.len() >= 2 {
            out.push(EqualLevel {
                level: base_price,
                side,
                strength: occurrences.len(),
                occurrences,
            });
        }
    }
}

/// Detect liquidity sweeps: equal-level stop raids and zone liquidity grabs.
///
/// A raid breaches the equal level and closes back through it (by >=0.05%)
/// within the next 3 candles. A grab breaches a detected liquidity zone and
/// reverses through it by >=0.1% within the next 4 candles.
pub fn detect_liquidity_sweeps(bars: &[Bar], zones: &[LiquidityZone]) -> Vec<Sweep> {
    let mut sweeps = Vec::new();

    for eq in find_equal_levels(bars, 0.0005) {
        let last_idx = eq.occurrences.iter().copied().max().unwrap_or(0);
        let window_end = (last_idx + 21).min(bars.len());
        for i in last_idx + 1..window_end {
            let candle = &bars[i];
            match eq.side {
                LiquiditySide::High => {
                    if candle.high > eq.level * 1.0001 {
                        let reversal = bars[i + 1..(i + 4).min(bars.len())]
                            .iter()
                            .map(|b| b.close)
                            .fold(f64::MAX, f64::min);
                        if reversal < eq.level * 0.9995 {
                            sweeps.push(Sweep {
                                timestamp: candle.timestamp,
                                pattern: SweepPattern::StopLossRaid,
                                kind: SweepKind::EqualHighs,
                                level: eq.level,
                                sweep_strength: (candle.high - eq.level) / eq.level,
                                reversal_strength: (eq.level - reversal) / eq.level,
                                manipulation_score: (candle.high - eq.level) / eq.level
                                    + (eq.level - reversal) / eq.level,
                            });
                        }
                        break;
                    }
                }
                LiquiditySide::Low => {
                    if candle.low < eq.level * 0.9999 {
                        let reversal = bars[i + 1..(i + 4).min(bars.len())]
                            .iter()
                            .map(|b| b.close)
                            .fold(f64::MIN, f64::max);
                        if reversal > eq.level * 1.0005 {
                            sweeps.push(Sweep {
                                timestamp: candle.timestamp,
                                pattern: SweepPattern::StopLossRaid,
                                kind: SweepKind::EqualLows,
                                level: eq.level,
                                sweep_strength: (eq.level - candle.low) / eq.level,
                                reversal_strength: (reversal - eq.level) / eq.level,
                                manipulation_score: (eq.level - candle.low) / eq.level
                                    + (reversal - eq.level) / eq.level,
                            });
                        }
                        break;
                    }
                }
            }
        }
    }

    for zone in zones {
        let window_end = (zone.index + 26).min(bars.len());
        for i in zone.index + 1..window_end {
            let candle = &bars[i];
            match zone.side {
                LiquiditySide::High => {
                    if candle.high > zone.level {
                        let reversal = bars[i + 1..(i + 5).min(bars.len())]
                            .iter()
                            .map(|b| b.close)
                            .fold(f64::MAX, f64::min);
                        if reversal < zone.level * 0.999 {
                            let sweep_strength = (candle.high - zone.level) / zone.level;
                            let reversal_strength = (zone.level - reversal) / zone.level;
                            sweeps.push(Sweep {
                                timestamp: candle.timestamp,
                                pattern: SweepPattern::LiquidityGrab,
                                kind: SweepKind::High,
                                level: zone.level,
                                sweep_strength,
                                reversal_strength,
                                manipulation_score: sweep_strength + reversal_strength,
                            });
                        }
                        break;
                    }
                }
                LiquiditySide::Low => {
                    if candle.low < zone.level {
                        let reversal = bars[i + 1..(i + 5).min(bars.len())]
                            .iter()
                            .map(|b| b.close)
                            .fold(f64::MIN, f64::max);
                        if reversal > zone.level * 1.001 {
                            let sweep_strength = (zone.level - candle.low) / zone.level;
                            let reversal_strength = (reversal - zone.level) / zone.level;
                            sweeps.push(Sweep {
                                timestamp: candle.timestamp,
                                pattern: SweepPattern::LiquidityGrab,
                                kind: SweepKind::Low,
                                level: zone.level,
                                sweep_strength,
                                reversal_strength,
                                manipulation_score: sweep_strength + reversal_strength,
                            });
                        }
                        break;
                    }
                }
            }
        }
    }

    sweeps.sort_by_key(|s| s.timestamp);
    sweeps
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()
                + Duration::minutes(15 * i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    fn flat(i: usize, c: f64) -> Bar {
        bar(i, c - 0.0001, c + 0.0002, c - 0.0002, c)
    }

    /// Two equal highs at 1.3000 (12 bars apart), then a raid above and a
    /// close back below within 3 candles.
    fn equal_highs_raid_series() -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..8).map(|i| flat(i, 1.2950)).collect();
        bars.push(bar(8, 1.2950, 1.3000, 1.2945, 1.2980)); // first equal high
        bars.extend((9..20).map(|i| flat(i, 1.2955)));
        bars.push(bar(20, 1.2955, 1.3000, 1.2950, 1.2985)); // second equal high
        bars.extend((21..26).map(|i| flat(i, 1.2960)));
        bars.push(bar(26, 1.2960, 1.3010, 1.2958, 1.2998)); // the sweep candle
        bars.push(bar(27, 1.2998, 1.2999, 1.2940, 1.2950)); // sharp reversal
        bars.push(bar(28, 1.2950, 1.2960, 1.2935, 1.2945));
        bars.extend((29..34).map(|i| flat(i, 1.2950)));
        bars
    }

    #[test]
    fn equal_highs_raid_is_detected_as_stop_loss_raid() {
        let bars = equal_highs_raid_series();
        let sweeps = detect_liquidity_sweeps(&bars, &[]);
        let raid = sweeps
            .iter()
            .find(|s| s.pattern == SweepPattern::StopLossRaid)
            .expect("expected an equal-highs raid");
        assert_eq!(raid.kind, SweepKind::EqualHighs);
        assert_eq!(raid.kind.side(), LiquiditySide::High);
        assert!((raid.level - 1.3000).abs() < 1e-9);
        assert!(raid.sweep_strength > 0.0);
        assert!(raid.reversal_strength > 0.0);
        assert!(
            (raid.manipulation_score - (raid.sweep_strength + raid.reversal_strength)).abs()
                < 1e-12
        );
    }

    #[test]
    fn breach_without_reversal_is_not_a_sweep() {
        let mut bars = equal_highs_raid_series();
        // Rewrite the reversal: price holds above the level instead.
        bars[27] = bar(27, 1.2998, 1.3010, 1.2996, 1.3008);
        bars[28] = bar(28, 1.3008, 1.3015, 1.3002, 1.3012);
        for i in 29..34 {
            bars[i] = flat(i, 1.3010);
        }
        let sweeps = detect_liquidity_sweeps(&bars, &[]);
        assert!(sweeps
            .iter()
            .all(|s| s.pattern != SweepPattern::StopLossRaid));
    }

    #[test]
    fn equal_levels_require_tolerance_match() {
        let bars = equal_highs_raid_series();
        let levels = find_equal_levels(&bars, 0.0005);
        let highs: Vec<&EqualLevel> = levels
            .iter()
            .filter(|l| l.side == LiquiditySide::High)
            .collect();
        assert!(!highs.is_empty());
        assert!(highs[0].occurrences.len() >= 2);
    }

    /// Repeated highs at the same level within one window, near the
    /// current price, make a liquidity zone.
    fn clustered_highs_series() -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..22).map(|i| flat(i, 1.1000)).collect();
        for i in 22..28 {
            bars.push(bar(i, 1.0998, 1.1030, 1.0995, 1.1005));
        }
        bars.extend((28..45).map(|i| flat(i, 1.1002)));
        bars
    }

    #[test]
    fn clustered_highs_become_a_zone() {
        let bars = clustered_highs_series();
        let zones = detect_liquidity_zones(&bars, 0.002);
        let high_zone = zones
            .iter()
            .find(|z| z.side == LiquiditySide::High && (z.level - 1.1030).abs() < 1e-9)
            .expect("expected a high-side liquidity zone");
        assert!(high_zone.touches >= 3);
        assert!(!high_zone.swept);
    }

    #[test]
    fn zone_breach_marks_swept() {
        let mut bars = clustered_highs_series();
        let n = bars.len();
        bars.push(bar(n, 1.1002, 1.1040, 1.1000, 1.1035));
        for i in n + 1..n + 12 {
            bars.push(flat(i, 1.1030));
        }
        let zones = detect_liquidity_zones(&bars, 0.002);
        assert!(zones
            .iter()
            .filter(|z| z.side == LiquiditySide::High && (z.level - 1.1030).abs() < 1e-9)
            .all(|z| z.swept));
    }

    #[test]
    fn zones_are_pruned_per_side() {
        let bars = clustered_highs_series();
        let zones = detect_liquidity_zones(&bars, 0.002);
        for side in [LiquiditySide::High, LiquiditySide::Low] {
            for swept in [false, true] {
                let count = zones
                    .iter()
                    .filter(|z| z.side == side && z.swept == swept)
                    .count();
                assert!(count <= 3, "side {:?} swept {} count {}", side, swept, count);
            }
        }
    }

    #[test]
    fn zone_grab_produces_liquidity_grab_sweep() {
        let mut bars = clustered_highs_series();
        let n = bars.len(); // 45
        bars.push(bar(n, 1.1002, 1.1045, 1.1000, 1.1040)); // breach of 1.1030
        bars.push(bar(n + 1, 1.1040, 1.1042, 1.1000, 1.1005)); // reversal below
        bars.extend((n + 2..n + 12).map(|i| flat(i, 1.1008)));

        let zones = detect_liquidity_zones(&bars, 0.002);
        let sweeps = detect_liquidity_sweeps(&bars, &zones);
        let grab = sweeps
            .iter()
            .find(|s| s.pattern == SweepPattern::LiquidityGrab && s.kind == SweepKind::High);
        assert!(grab.is_some(), "expected a liquidity grab, got {:?}", sweeps);
    }
}

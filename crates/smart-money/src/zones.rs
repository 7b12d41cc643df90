use analysis_core::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplyDemandKind {
    Supply,
    Demand,
}

/// A consolidation base from which price departed impulsively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyDemandZone {
    pub timestamp: DateTime<Utc>,
    pub index: usize,
    pub kind: SupplyDemandKind,
    pub top: f64,
    pub bottom: f64,
    /// Departure size relative to the average bar range of the base.
    pub strength: f64,
    pub tested: bool,
    pub valid: bool,
}

/// Detect supply/demand zones: a 10-bar consolidation (total range within
/// 2.5x the average bar range) followed by a departure of at least 2x the
/// average range within the next 5 bars. A later close beyond the far side
/// invalidates the zone.
pub fn detect_supply_demand_zones(bars: &[Bar]) -> Vec<SupplyDemandZone> {
    let mut zones = Vec::new();
    if bars.len() < 26 {
        return zones;
    }

    let lookback = 10usize;
    for i in 20..bars.len() - 5 {
        let base = &bars[i - lookback..i];
        let base_high = base.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let base_low = base.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let base_range = base_high - base_low;
        let avg_range = base.iter().map(Bar::range).sum::<f64>() / base.len() as f64;
        if avg_range <= 0.0 || base_range > avg_range * 2.5 {
            continue;
        }

        let departure_close = bars[i + 4].close;
        let move_size = (departure_close - bars[i].open).abs();
        if move_size <= avg_range * 2.0 {
            continue;
        }

        let kind = if departure_close > bars[i].open {
            SupplyDemandKind::Demand
        } else {
            SupplyDemandKind::Supply
        };
        zones.push(SupplyDemandZone {
            timestamp: bars[i].timestamp,
            index: i,
            kind,
            top: base_high,
            bottom: base_low,
            strength: move_size / avg_range,
            tested: false,
            valid: true,
        });
    }

    for zone in &mut zones {
        let future = &bars[zone.index + 1..];
        zone.tested = future
            .iter()
            .any(|b| b.low <= zone.top && b.high >= zone.bottom);
        if zone.tested {
            zone.valid = match zone.kind {
                SupplyDemandKind::Demand => !future.iter().any(|b| b.close < zone.bottom),
                SupplyDemandKind::Supply => !future.iter().any(|b| b.close > zone.top),
            };
        }
    }

    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
                + Duration::hours(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    fn ranging(i: usize, c: f64) -> Bar {
        // 6-pip bars alternating direction, total range stays tight.
        let drift: f64 = if i % 2 == 0 { 0.0002 } else { -0.0002 };
        bar(i, c, c + drift.abs() + 0.0002, c - 0.0004, c + drift)
    }

    /// 20 quiet bars, then an impulsive bullish departure at index 20.
    fn demand_series() -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..20).map(|i| ranging(i, 1.1000)).collect();
        bars.push(bar(20, 1.1000, 1.1030, 1.0998, 1.1028));
        bars.push(bar(21, 1.1028, 1.1055, 1.1025, 1.1050));
        bars.push(bar(22, 1.1050, 1.1080, 1.1048, 1.1075));
        bars.push(bar(23, 1.1075, 1.1100, 1.1070, 1.1095));
        bars.push(bar(24, 1.1095, 1.1120, 1.1090, 1.1115));
        bars.push(bar(25, 1.1115, 1.1130, 1.1110, 1.1125));
        bars
    }

    #[test]
    fn impulsive_departure_creates_demand_zone() {
        let zones = detect_supply_demand_zones(&demand_series());
        let demand: Vec<&SupplyDemandZone> = zones
            .iter()
            .filter(|z| z.kind == SupplyDemandKind::Demand)
            .collect();
        assert!(!demand.is_empty());
        let z = demand[0];
        assert!(z.valid);
        assert!(z.strength > 2.0);
        assert!(z.top > z.bottom);
        // The zone spans the consolidation, not the departure leg.
        assert!(z.top < 1.1030);
    }

    #[test]
    fn close_below_far_side_invalidates_demand() {
        let mut bars = demand_series();
        let n = bars.len();
        // Collapse back through the base and close below its bottom.
        bars.push(bar(n, 1.1125, 1.1126, 1.0980, 1.0985));
        bars.push(bar(n + 1, 1.0985, 1.0990, 1.0975, 1.0980));
        let zones = detect_supply_demand_zones(&bars);
        assert!(zones
            .iter()
            .filter(|z| z.kind == SupplyDemandKind::Demand && z.index == 20)
            .all(|z| z.tested && !z.valid));
    }

    #[test]
    fn quiet_tape_yields_no_zones() {
        let bars: Vec<Bar> = (0..40).map(|i| ranging(i, 1.1000)).collect();
        assert!(detect_supply_demand_zones(&bars).is_empty());
    }
}

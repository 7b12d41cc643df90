use analysis_core::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Premium/discount context over the current major trading range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiumDiscountZones {
    pub major_high: f64,
    pub major_low: f64,
    pub equilibrium: f64,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
}

impl PremiumDiscountZones {
    pub fn is_premium(&self, price: f64) -> bool {
        price > self.equilibrium
    }

    pub fn is_discount(&self, price: f64) -> bool {
        price < self.equilibrium
    }
}

/// Equilibrium is the midpoint of the highest high and lowest low over the
/// lookback window; premium above, discount below. Returns `None` until the
/// window is fully populated.
pub fn premium_discount_zones(bars: &[Bar], lookback: usize) -> Option<PremiumDiscountZones> {
    if bars.len() < lookback || lookback == 0 {
        return None;
    }
    let window = &bars[bars.len() - lookback..];
    let major_high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let major_low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);

    Some(PremiumDiscountZones {
        major_high,
        major_low,
        equilibrium: major_low + (major_high - major_low) / 2.0,
        range_start: window[0].timestamp,
        range_end: window[window.len() - 1].timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: usize, high: f64, low: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 4, 15, 0, 0, 0).unwrap()
                + Duration::hours(i as i64),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 1000.0,
        }
    }

    #[test]
    fn equilibrium_is_the_range_midpoint() {
        let bars: Vec<Bar> = (0..50)
            .map(|i| bar(i, 1.1000 + (i % 10) as f64 * 0.0010, 1.0900 + (i % 10) as f64 * 0.0010))
            .collect();
        let pd = premium_discount_zones(&bars, 50).unwrap();
        assert!((pd.major_high - 1.1090).abs() < 1e-9);
        assert!((pd.major_low - 1.0900).abs() < 1e-9);
        assert!((pd.equilibrium - 1.0995).abs() < 1e-9);
        assert!(pd.is_premium(1.1050));
        assert!(pd.is_discount(1.0950));
        assert!(!pd.is_premium(1.0995));
    }

    #[test]
    fn short_series_yields_none() {
        let bars: Vec<Bar> = (0..30).map(|i| bar(i, 1.1, 1.09)).collect();
        assert!(premium_discount_zones(&bars, 50).is_none());
    }
}

use analysis_core::{price_to_pips, Bar, SignalType};

use crate::EntryDetails;

/// Average True Range over the last `length` bars.
pub fn atr(bars: &[Bar], length: usize) -> Option<f64> {
    if length == 0 || bars.len() < length + 1 {
        return None;
    }
    let start = bars.len() - length;
    let sum: f64 = (start..bars.len())
        .map(|i| {
            let prev_close = bars[i - 1].close;
            let b = &bars[i];
            (b.high - b.low)
                .max((b.high - prev_close).abs())
                .max((b.low - prev_close).abs())
        })
        .sum();
    Some(sum / length as f64)
}

/// Widen the stop to the ATR-based distance when the structural stop is
/// tighter, then re-derive the target so the original risk:reward holds.
pub fn enhance_entry_with_atr(
    entry: &EntryDetails,
    bars: &[Bar],
    signal_type: SignalType,
    atr_length: usize,
    atr_multiplier: f64,
) -> EntryDetails {
    let Some(atr_value) = atr(bars, atr_length) else {
        return entry.clone();
    };
    if atr_multiplier <= 0.0 {
        return entry.clone();
    }

    let stop_distance = atr_value * atr_multiplier;
    let atr_stop = match signal_type {
        SignalType::Buy => entry.entry_price - stop_distance,
        SignalType::Sell => entry.entry_price + stop_distance,
        SignalType::Wait => return entry.clone(),
    };

    // Take the wider of the structural and ATR stops.
    let stop_loss = match signal_type {
        SignalType::Buy => entry.stop_loss.min(atr_stop),
        _ => entry.stop_loss.max(atr_stop),
    };

    let original_risk = (entry.entry_price - entry.stop_loss).abs();
    if original_risk <= 0.0 {
        return entry.clone();
    }
    let rr = (entry.take_profit - entry.entry_price).abs() / original_risk;

    let new_risk = (entry.entry_price - stop_loss).abs();
    let new_reward = new_risk * rr;
    let take_profit = match signal_type {
        SignalType::Buy => entry.entry_price + new_reward,
        _ => entry.entry_price - new_reward,
    };

    EntryDetails {
        entry_price: entry.entry_price,
        stop_loss,
        take_profit,
        rr_ratio: rr,
        risk_pips: price_to_pips(new_risk),
        reward_pips: price_to_pips(new_reward),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_with_range(n: usize, range: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Bar {
                timestamp: start + Duration::hours(i as i64),
                open: 1.1000,
                high: 1.1000 + range / 2.0,
                low: 1.1000 - range / 2.0,
                close: 1.1000,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn atr_of_constant_range_bars_is_the_range() {
        let bars = bars_with_range(20, 0.0010);
        let value = atr(&bars, 14).unwrap();
        assert!((value - 0.0010).abs() < 1e-9);
    }

    #[test]
    fn atr_needs_enough_bars() {
        let bars = bars_with_range(10, 0.0010);
        assert!(atr(&bars, 14).is_none());
    }

    #[test]
    fn wider_atr_stop_replaces_structural_stop_and_keeps_rr() {
        let bars = bars_with_range(20, 0.0020); // ATR 20 pips
        let entry = EntryDetails {
            entry_price: 1.1000,
            stop_loss: 1.0990, // 10-pip structural stop
            take_profit: 1.1020,
            rr_ratio: 2.0,
            risk_pips: 10.0,
            reward_pips: 20.0,
        };
        let enhanced = enhance_entry_with_atr(&entry, &bars, SignalType::Buy, 14, 2.5);
        // ATR stop = 1.1000 - 0.0050 = 1.0950, wider than 1.0990.
        assert!((enhanced.stop_loss - 1.0950).abs() < 1e-9);
        assert!((enhanced.rr_ratio - 2.0).abs() < 1e-9);
        assert!((enhanced.take_profit - 1.1100).abs() < 1e-9);
    }

    #[test]
    fn tighter_atr_stop_is_ignored() {
        let bars = bars_with_range(20, 0.0002); // ATR 2 pips
        let entry = EntryDetails {
            entry_price: 1.1000,
            stop_loss: 1.0990,
            take_profit: 1.1020,
            rr_ratio: 2.0,
            risk_pips: 10.0,
            reward_pips: 20.0,
        };
        let enhanced = enhance_entry_with_atr(&entry, &bars, SignalType::Buy, 14, 2.5);
        assert!((enhanced.stop_loss - 1.0990).abs() < 1e-9);
        assert!((enhanced.take_profit - 1.1020).abs() < 1e-9);
    }
}

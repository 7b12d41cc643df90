use analysis_core::{Bar, SignalDirection, TrendDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::swings::SwingPoint;
use crate::trend::identify_trend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    /// Break of Structure: continuation with the prevailing trend.
    Bos,
    /// Change of Character: break against the prevailing trend.
    Choch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakQuality {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureBreak {
    pub timestamp: DateTime<Utc>,
    pub kind: BreakKind,
    pub direction: SignalDirection,
    pub broken_level: f64,
    pub break_price: f64,
    pub close_price: f64,
    /// Break distance relative to the broken level, in percent, capped at 1.0.
    pub strength: f64,
    pub quality: BreakQuality,
    pub momentum_confirmed: bool,
    pub volume_confirmed: bool,
}

/// Detect structure breaks against the most recent prior swing levels.
///
/// A bullish break requires the candle's high AND close above the last swing
/// high, the previous `confirmation_candles` candles all bullish, and a break
/// strength above 0.1. Quality is high only with momentum, volume, and
/// strength above 0.3; only high-quality breaks with strength above 0.2 are
/// kept. Output is ordered strictly by timestamp.
pub fn detect_structure_breaks(
    bars: &[Bar],
    swing_highs: &[SwingPoint],
    swing_lows: &[SwingPoint],
    confirmation_candles: usize,
) -> Vec<StructureBreak> {
    let mut breaks = Vec::new();
    if swing_highs.is_empty() || swing_lows.is_empty() {
        return breaks;
    }

    // Only the most recent swings stay relevant for break levels.
    let recent_highs = tail(swing_highs, 20);
    let recent_lows = tail(swing_lows, 20);

    for i in confirmation_candles..bars.len() {
        let candle = &bars[i];

        let last_high = recent_highs.iter().rev().find(|s| s.index < i);
        let last_low = recent_lows.iter().rev().find(|s| s.index < i);
        let (Some(last_high), Some(last_low)) = (last_high, last_low) else {
            continue;
        };

        if candle.high > last_high.price && candle.close > last_high.price {
            let momentum = bars[i - confirmation_candles..i].iter().all(Bar::is_bullish);
            let strength =
                ((candle.high - last_high.price) / last_high.price * 100.0).min(1.0);
            if momentum && strength > 0.1 {
                let volume = volume_confirmed(bars, i);
                push_break(
                    &mut breaks,
                    bars,
                    swing_highs,
                    swing_lows,
                    i,
                    SignalDirection::Bullish,
                    last_high.price,
                    candle.high,
                    strength,
                    momentum,
                    volume,
                );
            }
        } else if candle.low < last_low.price && candle.close < last_low.price {
            let momentum = bars[i - confirmation_candles..i].iter().all(Bar::is_bearish);
            let strength = ((last_low.price - candle.low) / last_low.price * 100.0).min(1.0);
            if momentum && strength > 0.1 {
                let volume = volume_confirmed(bars, i);
                push_break(
                    &mut breaks,
                    bars,
                    swing_highs,
                    swing_lows,
                    i,
                    SignalDirection::Bearish,
                    last_low.price,
                    candle.low,
                    strength,
                    momentum,
                    volume,
                );
            }
        }
    }

    // Keep only the high-quality subset.
    let total = breaks.len();
    breaks.retain(|b| b.quality == BreakQuality::High && b.strength > 0.2);
    tracing::debug!(kept = breaks.len(), total, "structure break filter");
    breaks
}

#[allow(clippy::too_many_arguments)]
fn push_break(
    breaks: &mut Vec<StructureBreak>,
    bars: &[Bar],
    swing_highs: &[SwingPoint],
    swing_lows: &[SwingPoint],
    i: usize,
    direction: SignalDirection,
    broken_level: f64,
    break_price: f64,
    strength: f64,
    momentum_confirmed: bool,
    volume_confirmed: bool,
) {
    let candle = &bars[i];
    let quality = if momentum_confirmed && volume_confirmed && strength > 0.3 {
        BreakQuality::High
    } else {
        BreakQuality::Medium
    };

    // The trend leading into the break decides BOS vs CHOCH: a break against
    // the prior trend is a change of character.
    let prior_trend = trend_before(swing_highs, swing_lows, i);
    let kind = match (prior_trend, direction) {
        (TrendDirection::Downtrend, SignalDirection::Bullish)
        | (TrendDirection::Uptrend, SignalDirection::Bearish) => BreakKind::Choch,
        _ => BreakKind::Bos,
    };

    breaks.push(StructureBreak {
        timestamp: candle.timestamp,
        kind,
        direction,
        broken_level,
        break_price,
        close_price: candle.close,
        strength,
        quality,
        momentum_confirmed,
        volume_confirmed,
    });
}

fn trend_before(
    swing_highs: &[SwingPoint],
    swing_lows: &[SwingPoint],
    i: usize,
) -> TrendDirection {
    let highs: Vec<SwingPoint> = swing_highs.iter().filter(|s| s.index < i).copied().collect();
    let lows: Vec<SwingPoint> = swing_lows.iter().filter(|s| s.index < i).copied().collect();
    identify_trend(&highs, &lows)
}

/// Volume confirmation: current volume above 1.2x the mean of the previous
/// 20 bars. Bars without volume data confirm by default.
fn volume_confirmed(bars: &[Bar], i: usize) -> bool {
    if bars[i].volume <= 0.0 {
        return true;
    }
    let start = i.saturating_sub(20);
    let window = &bars[start..i];
    if window.is_empty() {
        return true;
    }
    let avg = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
    avg <= 0.0 || bars[i].volume >= avg * 1.2
}

fn tail(swings: &[SwingPoint], n: usize) -> &[SwingPoint] {
    &swings[swings.len().saturating_sub(n)..]
}

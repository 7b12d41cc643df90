use analysis_core::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBlockKind {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneQuality {
    Low,
    Medium,
    High,
}

impl ZoneQuality {
    fn downgrade(self) -> Self {
        match self {
            ZoneQuality::High => ZoneQuality::Medium,
            _ => ZoneQuality::Low,
        }
    }
}

/// The last strong candle before an impulsive move; a zone institutions may
/// defend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBlock {
    pub timestamp: DateTime<Utc>,
    pub index: usize,
    pub kind: OrderBlockKind,
    pub top: f64,
    pub bottom: f64,
    pub strength: f64,
    pub body_ratio: f64,
    pub volume_strength: f64,
    pub tested: bool,
    /// One-way: a block never becomes valid again once invalidated.
    pub valid: bool,
    pub quality: ZoneQuality,
}

/// Detect order blocks: a strong directional candle whose move is confirmed
/// by the next two bars and whose range stands out from recent volatility.
pub fn detect_order_blocks(bars: &[Bar], lookback: usize) -> Vec<OrderBlock> {
    let mut blocks = Vec::new();
    if bars.len() < lookback + 3 {
        return blocks;
    }

    for i in lookback..bars.len() - 2 {
        let candle = &bars[i];
        let next = &bars[i + 1];
        let next2 = &bars[i + 2];

        let body = candle.body();
        let range = candle.range();
        if range <= 0.0 {
            continue;
        }

        let volume_strength = volume_strength(bars, i);

        let bullish = candle.is_bullish()
            && body > range * 0.6
            && next.close > candle.close
            && next2.close > next.low
            && range > stdev(bars[i.saturating_sub(10)..i].iter().map(|b| b.high)) * 1.5;

        let bearish = !bullish
            && candle.is_bearish()
            && body > range * 0.6
            && next.close < candle.close
            && next2.close < next.high
            && range > stdev(bars[i.saturating_sub(10)..i].iter().map(|b| b.low)) * 1.5;

        if !bullish && !bearish {
            continue;
        }

        let body_ratio = body / range;
        let move_strength = body / candle.open;
        let strength =
            (body_ratio * 0.4 + move_strength * 0.4 + (volume_strength - 1.0) * 0.2).clamp(0.0, 1.0);

        let (kind, top, bottom) = if bullish {
            (
                OrderBlockKind::Bullish,
                candle.open.max(candle.close),
                candle.low,
            )
        } else {
            (
                OrderBlockKind::Bearish,
                candle.high,
                candle.open.min(candle.close),
            )
        };

        blocks.push(OrderBlock {
            timestamp: candle.timestamp,
            index: i,
            kind,
            top,
            bottom,
            strength,
            body_ratio,
            volume_strength,
            tested: false,
            valid: true,
            quality: if strength > 0.5 {
                ZoneQuality::High
            } else {
                ZoneQuality::Medium
            },
        });
    }

    mark_tested(bars, &mut blocks);

    blocks.retain(|ob| ob.quality >= ZoneQuality::Medium && ob.strength > 0.3 && ob.valid);
    blocks
}

/// A block is tested once price re-enters it. A test that fails to bounce
/// (bullish) or reject (bearish) by at least 5 pips within the next 5 bars
/// downgrades the quality one step.
fn mark_tested(bars: &[Bar], blocks: &mut [OrderBlock]) {
    for ob in blocks.iter_mut() {
        let future = &bars[ob.index + 1..];
        let touch = match ob.kind {
            OrderBlockKind::Bullish => future.iter().position(|b| b.low <= ob.top),
            OrderBlockKind::Bearish => future.iter().position(|b| b.high >= ob.bottom),
        };
        let Some(touch_idx) = touch else { continue };
        ob.tested = true;

        let after_touch = &future[touch_idx..];
        if after_touch.len() <= 3 {
            continue;
        }
        let window = &after_touch[..after_touch.len().min(5)];
        let reacted = match ob.kind {
            OrderBlockKind::Bullish => {
                let bounce = window.iter().map(|b| b.high).fold(f64::MIN, f64::max) - ob.top;
                bounce >= ob.top * 0.0005
            }
            OrderBlockKind::Bearish => {
                let rejection = ob.bottom - window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
                rejection >= ob.bottom * 0.0005
            }
        };
        if !reacted {
            ob.quality = ob.quality.downgrade();
        }
    }
}

fn volume_strength(bars: &[Bar], i: usize) -> f64 {
    if bars[i].volume <= 0.0 {
        return 1.0;
    }
    let start = i.saturating_sub(20);
    let window = &bars[start..i];
    if window.is_empty() {
        return 1.0;
    }
    let avg = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
    if avg <= 0.0 {
        1.0
    } else {
        (bars[i].volume / avg).min(2.0)
    }
}

/// Sample standard deviation, as the reference volatility for range checks.
pub(crate) fn stdev(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

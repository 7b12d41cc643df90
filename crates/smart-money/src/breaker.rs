use analysis_core::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order_blocks::{OrderBlock, OrderBlockKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPattern {
    /// The block was mitigated (touched with a reaction) and then broken.
    MitigationToBreaker,
    /// The block failed outright, without a prior mitigation.
    DirectFailure,
}

/// A failed order block, now expected to act in the opposite direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerBlock {
    /// Timestamp of the source order block.
    pub source_timestamp: DateTime<Utc>,
    pub formation_timestamp: DateTime<Utc>,
    pub kind: OrderBlockKind,
    pub source_kind: OrderBlockKind,
    pub top: f64,
    pub bottom: f64,
    pub strength: f64,
    pub pattern: BreakerPattern,
    pub mitigation_timestamp: Option<DateTime<Utc>>,
}

/// Detect breaker blocks from failed order blocks.
///
/// A bullish block that is first mitigated and later closed below its bottom
/// (with follow-through) becomes a bearish breaker; a direct failure without
/// mitigation needs the stronger break threshold. Symmetric for bearish.
pub fn detect_breaker_blocks(bars: &[Bar], order_blocks: &[OrderBlock]) -> Vec<BreakerBlock> {
    let mut breakers = Vec::new();

    for ob in order_blocks {
        let future_end = (ob.index + 51).min(bars.len());
        let future = &bars[ob.index + 1..future_end];
        if future.is_empty() {
            continue;
        }

        let mitigation = find_mitigation(ob, future);

        if let Some(mitigation_offset) = mitigation {
            let mitigation_index = ob.index + 1 + mitigation_offset;
            let post_end = (mitigation_index + 31).min(bars.len());
            for i in mitigation_index + 1..post_end {
                if let Some(b) =
                    breaker_at(bars, ob, i, BreakerPattern::MitigationToBreaker, 0.999)
                {
                    breakers.push(BreakerBlock {
                        mitigation_timestamp: Some(bars[mitigation_index].timestamp),
                        ..b
                    });
                    break;
                }
            }
        } else {
            for i in ob.index + 1..future_end {
                if let Some(b) = breaker_at(bars, ob, i, BreakerPattern::DirectFailure, 0.995) {
                    breakers.push(b);
                    break;
                }
            }
        }
    }

    breakers
}

/// Mitigation: price enters the block and reacts away from it (>=0.2%
/// against the probing candle's close) within the next 4 bars. Returns the
/// offset of the mitigating candle within `future`.
fn find_mitigation(ob: &OrderBlock, future: &[Bar]) -> Option<usize> {
    for (i, candle) in future.iter().enumerate() {
        let reaction = &future[i + 1..(i + 5).min(future.len())];
        if reaction.is_empty() {
            continue;
        }
        match ob.kind {
            OrderBlockKind::Bullish => {
                if candle.low >= ob.bottom && candle.low <= ob.top {
                    let best = reaction.iter().map(|b| b.close).fold(f64::MIN, f64::max);
                    if best > candle.close * 1.002 {
                        return Some(i);
                    }
                }
            }
            OrderBlockKind::Bearish => {
                if candle.high >= ob.bottom && candle.high <= ob.top {
                    let worst = reaction.iter().map(|b| b.close).fold(f64::MAX, f64::min);
                    if worst < candle.close * 0.998 {
                        return Some(i);
                    }
                }
            }
        }
    }
    None
}

/// A breaker forms at bar i when the close clears the far side of the block
/// by the given factor and the next few closes follow through beyond the
/// broken edge.
fn breaker_at(
    bars: &[Bar],
    ob: &OrderBlock,
    i: usize,
    pattern: BreakerPattern,
    break_factor: f64,
) -> Option<BreakerBlock> {
    let candle = &bars[i];
    match ob.kind {
        OrderBlockKind::Bullish => {
            if candle.close < ob.bottom * break_factor
                && follow_through_below(bars, i, ob.bottom)
            {
                return Some(BreakerBlock {
                    source_timestamp: ob.timestamp,
                    formation_timestamp: candle.timestamp,
                    kind: OrderBlockKind::Bearish,
                    source_kind: OrderBlockKind::Bullish,
                    top: ob.top,
                    bottom: ob.bottom,
                    strength: (ob.bottom - candle.close) / ob.bottom,
                    pattern,
                    mitigation_timestamp: None,
                });
            }
        }
        OrderBlockKind::Bearish => {
            let factor = 2.0 - break_factor; // 1.001 / 1.005 mirror
            if candle.close > ob.top * factor && follow_through_above(bars, i, ob.top) {
                return Some(BreakerBlock {
                    source_timestamp: ob.timestamp,
                    formation_timestamp: candle.timestamp,
                    kind: OrderBlockKind::Bullish,
                    source_kind: OrderBlockKind::Bearish,
                    top: ob.top,
                    bottom: ob.bottom,
                    strength: (candle.close - ob.top) / ob.top,
                    pattern,
                    mitigation_timestamp: None,
                });
            }
        }
    }
    None
}

/// Direct failures confirm immediately; mitigation-to-breaker transitions
/// confirm when the mean of the next few closes stays beyond the edge.
fn follow_through_below(bars: &[Bar], i: usize, edge: f64) -> bool {
    let window = &bars[i + 1..(i + 5).min(bars.len())];
    if window.is_empty() {
        return true;
    }
    let mean = window.iter().map(|b| b.close).sum::<f64>() / window.len() as f64;
    mean < edge
}

fn follow_through_above(bars: &[Bar], i: usize, edge: f64) -> bool {
    let window = &bars[i + 1..(i + 5).min(bars.len())];
    if window.is_empty() {
        return true;
    }
    let mean = window.iter().map(|b| b.close).sum::<f64>() / window.len() as f64;
    mean > edge
}

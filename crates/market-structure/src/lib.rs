pub mod breaks;
pub mod swings;
pub mod trend;

pub use breaks::*;
pub use swings::*;
pub use trend::*;

use analysis_core::{AnalysisError, Bar, TrendDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complete market structure snapshot for one timeframe window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStructure {
    pub swing_highs: Vec<SwingPoint>,
    pub swing_lows: Vec<SwingPoint>,
    pub trend_direction: TrendDirection,
    pub trend_strength: f64,
    pub structure_breaks: Vec<StructureBreak>,
    pub current_price: f64,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Analyzes market structure: swing points, trend, and structural breaks.
pub struct MarketStructureAnalyzer {
    swing_length: usize,
    confirmation_candles: usize,
}

impl MarketStructureAnalyzer {
    pub fn new(swing_length: usize) -> Self {
        Self {
            swing_length,
            confirmation_candles: 2,
        }
    }

    pub fn with_confirmation_candles(mut self, candles: usize) -> Self {
        self.confirmation_candles = candles;
        self
    }

    pub fn analyze(&self, bars: &[Bar]) -> Result<MarketStructure, AnalysisError> {
        if bars.len() < self.swing_length * 2 + 1 {
            return Err(AnalysisError::InsufficientData(format!(
                "need at least {} bars for swing detection, got {}",
                self.swing_length * 2 + 1,
                bars.len()
            )));
        }

        let (swing_highs, swing_lows) = find_swing_points(bars, self.swing_length);
        let trend_direction = identify_trend(&swing_highs, &swing_lows);
        let trend_strength = trend_strength(trend_direction, &swing_highs, &swing_lows);
        let structure_breaks = detect_structure_breaks(
            bars,
            &swing_highs,
            &swing_lows,
            self.confirmation_candles,
        );

        tracing::debug!(
            swing_highs = swing_highs.len(),
            swing_lows = swing_lows.len(),
            trend = %trend_direction,
            breaks = structure_breaks.len(),
            "market structure analyzed"
        );

        let last = bars[bars.len() - 1];
        Ok(MarketStructure {
            swing_highs,
            swing_lows,
            trend_direction,
            trend_strength,
            structure_breaks,
            current_price: last.close,
            analysis_timestamp: last.timestamp,
        })
    }
}

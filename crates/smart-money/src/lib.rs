pub mod breaker;
pub mod fvg;
pub mod liquidity;
pub mod order_blocks;
pub mod premium_discount;
mod prune;
pub mod zones;

pub use breaker::*;
pub use fvg::*;
pub use liquidity::*;
pub use order_blocks::*;
pub use premium_discount::*;
pub use zones::*;

use analysis_core::{AnalysisError, Bar};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prune::prune_relevant;

/// Complete Smart Money Concepts snapshot for one timeframe window.
///
/// Detector outputs are immutable values: each pass over a window emits a
/// fresh analysis, nothing mutates older records in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmcAnalysis {
    pub fair_value_gaps: Vec<FairValueGap>,
    /// Active (<100% mitigated) FVGs, pruned to the most relevant.
    pub active_fvgs: Vec<FairValueGap>,
    pub order_blocks: Vec<OrderBlock>,
    /// Valid order blocks, pruned to the most relevant.
    pub valid_order_blocks: Vec<OrderBlock>,
    pub liquidity_zones: Vec<LiquidityZone>,
    pub liquidity_sweeps: Vec<Sweep>,
    pub supply_demand_zones: Vec<SupplyDemandZone>,
    /// Valid supply/demand zones, pruned to the most relevant.
    pub valid_supply_demand: Vec<SupplyDemandZone>,
    pub breaker_blocks: Vec<BreakerBlock>,
    pub premium_discount: Option<PremiumDiscountZones>,
    pub current_price: f64,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Analyzes Smart Money Concepts: FVGs, order blocks, liquidity, supply/
/// demand, breaker blocks and premium/discount context.
pub struct SmartMoneyAnalyzer {
    fvg_min_size: f64,
    order_block_lookback: usize,
    liquidity_threshold: f64,
    swing_point_lookback: usize,
}

impl SmartMoneyAnalyzer {
    pub fn new(
        fvg_min_size: f64,
        order_block_lookback: usize,
        liquidity_threshold: f64,
        swing_point_lookback: usize,
    ) -> Self {
        Self {
            fvg_min_size,
            order_block_lookback,
            liquidity_threshold,
            swing_point_lookback,
        }
    }

    pub fn analyze(&self, bars: &[Bar]) -> Result<SmcAnalysis, AnalysisError> {
        if bars.len() < 3 {
            return Err(AnalysisError::InsufficientData(
                "need at least 3 bars for SMC analysis".to_string(),
            ));
        }
        let last = bars[bars.len() - 1];
        let current_price = last.close;

        let fair_value_gaps = detect_fair_value_gaps(bars, self.fvg_min_size);
        let order_blocks = detect_order_blocks(bars, self.order_block_lookback);
        let liquidity_zones = detect_liquidity_zones(bars, self.liquidity_threshold);
        let supply_demand_zones = detect_supply_demand_zones(bars);
        let liquidity_sweeps = detect_liquidity_sweeps(bars, &liquidity_zones);
        let breaker_blocks = detect_breaker_blocks(bars, &order_blocks);
        let premium_discount = premium_discount_zones(bars, self.swing_point_lookback);

        // Breakers invalidate their source order block.
        let order_blocks: Vec<OrderBlock> = order_blocks
            .into_iter()
            .map(|mut ob| {
                if breaker_blocks.iter().any(|b| b.source_timestamp == ob.timestamp) {
                    ob.valid = false;
                }
                ob
            })
            .collect();

        let active_fvgs = prune_relevant(
            fair_value_gaps.iter().filter(|f| f.is_active()).cloned().collect(),
            current_price,
            5,
            |f| ((f.top + f.bottom) / 2.0, f.top - f.bottom),
            |f| f.index,
        );
        let valid_order_blocks = prune_relevant(
            order_blocks.iter().filter(|ob| ob.valid).cloned().collect(),
            current_price,
            5,
            |ob| ((ob.top + ob.bottom) / 2.0, ob.top - ob.bottom),
            |ob| ob.index,
        );
        let valid_supply_demand = prune_relevant(
            supply_demand_zones.iter().filter(|z| z.valid).cloned().collect(),
            current_price,
            3,
            |z| ((z.top + z.bottom) / 2.0, z.top - z.bottom),
            |z| z.index,
        );

        tracing::debug!(
            fvgs = fair_value_gaps.len(),
            active_fvgs = active_fvgs.len(),
            order_blocks = order_blocks.len(),
            liquidity = liquidity_zones.len(),
            sweeps = liquidity_sweeps.len(),
            zones = supply_demand_zones.len(),
            breakers = breaker_blocks.len(),
            "smart money analysis"
        );

        Ok(SmcAnalysis {
            fair_value_gaps,
            active_fvgs,
            order_blocks,
            valid_order_blocks,
            liquidity_zones,
            liquidity_sweeps,
            supply_demand_zones,
            valid_supply_demand,
            breaker_blocks,
            premium_discount,
            current_price,
            analysis_timestamp: last.timestamp,
        })
    }
}

use analysis_core::{MarketBias, SignalType, TrendDirection};
use serde::{Deserialize, Serialize};

/// Outcome of the bias-based confidence assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasDecision {
    Execute,
    LowConfidence,
    Wait,
}

/// Top-down bias rule: the higher timeframe defines the primary bias and
/// the medium timeframe must confirm it.
pub struct BiasFilter;

impl BiasFilter {
    /// H4 uptrend + H1 uptrend => Bullish; H4 trending + H1 sideways =>
    /// Neutral; H4 and H1 opposed => Conflict; H4 sideways => Neutral.
    pub fn market_bias(
        htf_trend: Option<TrendDirection>,
        mtf_trend: Option<TrendDirection>,
    ) -> MarketBias {
        match htf_trend {
            Some(TrendDirection::Uptrend) => match mtf_trend {
                Some(TrendDirection::Uptrend) => MarketBias::Bullish,
                Some(TrendDirection::Consolidation) | None => MarketBias::Neutral,
                Some(TrendDirection::Downtrend) => MarketBias::Conflict,
            },
            Some(TrendDirection::Downtrend) => match mtf_trend {
                Some(TrendDirection::Downtrend) => MarketBias::Bearish,
                Some(TrendDirection::Consolidation) | None => MarketBias::Neutral,
                Some(TrendDirection::Uptrend) => MarketBias::Conflict,
            },
            _ => MarketBias::Neutral,
        }
    }

    /// Execution requires strict alignment: buys only in a bullish bias,
    /// sells only in a bearish one.
    pub fn can_execute_trade(signal: SignalType, bias: MarketBias) -> bool {
        matches!(
            (bias, signal),
            (MarketBias::Bullish, SignalType::Buy) | (MarketBias::Bearish, SignalType::Sell)
        )
    }

    /// Graded assessment: perfect alignment executes outright; otherwise
    /// multi-timeframe signal confluence can still carry the trade.
    pub fn assess_signal_confidence(
        signal: SignalType,
        bias: MarketBias,
        confluence_count: usize,
        total_signal_score: u32,
    ) -> (BiasDecision, f64, String) {
        if Self::can_execute_trade(signal, bias) {
            let side = if signal == SignalType::Buy { "bullish" } else { "bearish" };
            return (
                BiasDecision::Execute,
                1.0,
                format!("perfect {} alignment", side),
            );
        }

        if confluence_count >= 3 && total_signal_score >= 30 {
            (
                BiasDecision::Execute,
                0.9,
                format!(
                    "strong multi-timeframe confluence ({} TFs, total score {})",
                    confluence_count, total_signal_score
                ),
            )
        } else if confluence_count >= 2 && total_signal_score >= 20 {
            (
                BiasDecision::Execute,
                0.7,
                format!(
                    "good multi-timeframe confluence ({} TFs, total score {})",
                    confluence_count, total_signal_score
                ),
            )
        } else if confluence_count >= 1 {
            (
                BiasDecision::LowConfidence,
                0.4,
                format!("weak confluence ({} TFs aligned)", confluence_count),
            )
        } else {
            (
                BiasDecision::Wait,
                0.2,
                "no significant timeframe confluence".to_string(),
            )
        }
    }
}

pub mod atr;
pub mod confluence;
pub mod entry;

pub use atr::*;
pub use confluence::*;
pub use entry::*;

use analysis_core::{MarketBias, SignalDirection, SignalStrength, SignalType};
use market_structure::MarketStructure;
use serde::{Deserialize, Serialize};
use smart_money::SmcAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupType {
    Breakout,
    Pullback,
}

/// A per-timeframe trade candidate. Lives only through one scan iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub signal_type: SignalType,
    pub strength: SignalStrength,
    pub direction: SignalDirection,
    pub confluence_score: i32,
    pub confluence_factors: Vec<ConfluenceFactor>,
    pub setup_type: SetupType,
    pub entry: Option<EntryDetails>,
    /// Why an otherwise-directional candidate degraded to Wait.
    pub wait_reason: Option<String>,
}

impl Candidate {
    pub fn wait(reason: impl Into<String>) -> Self {
        Self {
            signal_type: SignalType::Wait,
            strength: SignalStrength::Weak,
            direction: SignalDirection::Neutral,
            confluence_score: 0,
            confluence_factors: Vec::new(),
            setup_type: SetupType::Pullback,
            entry: None,
            wait_reason: Some(reason.into()),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.signal_type != SignalType::Wait && self.entry.is_some()
    }

    pub fn rr_ratio(&self) -> f64 {
        self.entry.as_ref().map(|e| e.rr_ratio).unwrap_or(0.0)
    }
}

/// Generates per-timeframe candidates from the weighted confluence model.
pub struct SignalGenerator {
    min_confluence_score: i32,
    min_rr_ratio: f64,
}

impl SignalGenerator {
    pub fn new(min_confluence_score: i32, min_rr_ratio: f64) -> Self {
        Self {
            min_confluence_score,
            min_rr_ratio,
        }
    }

    /// Produce a candidate for one timeframe.
    ///
    /// Direction comes from the local timeframe trend, never the global
    /// bias; the bias only contributes confluence. The direction invariant
    /// (Buy: sl < entry < tp, Sell: tp < entry < sl) and the minimum R:R
    /// are enforced before a non-Wait candidate is returned.
    pub fn generate(
        &self,
        structure: &MarketStructure,
        smc: &SmcAnalysis,
        current_price: f64,
        market_bias: Option<MarketBias>,
    ) -> Candidate {
        let confluence = score_confluence(structure, smc, current_price, market_bias);

        let signal_type = match confluence.direction {
            SignalDirection::Bullish => SignalType::Buy,
            SignalDirection::Bearish => SignalType::Sell,
            SignalDirection::Neutral => SignalType::Wait,
        };

        if signal_type == SignalType::Wait {
            return Candidate {
                confluence_score: confluence.total_score,
                confluence_factors: confluence.factors,
                ..Candidate::wait("no clear local trend direction")
            };
        }

        if confluence.total_score < self.min_confluence_score {
            return Candidate {
                direction: confluence.direction,
                confluence_score: confluence.total_score,
                confluence_factors: confluence.factors.clone(),
                ..Candidate::wait(format!(
                    "confluence {} below minimum {}",
                    confluence.total_score, self.min_confluence_score
                ))
            };
        }

        let setup_type = if confluence.has_bos_factor() {
            SetupType::Breakout
        } else {
            SetupType::Pullback
        };

        let entry = match build_entry(
            signal_type,
            current_price,
            smc,
            setup_type,
            self.min_rr_ratio,
        ) {
            Ok(entry) => entry,
            Err(reason) => {
                tracing::info!(%signal_type, %reason, "entry construction degraded to WAIT");
                return Candidate {
                    direction: confluence.direction,
                    confluence_score: confluence.total_score,
                    confluence_factors: confluence.factors.clone(),
                    setup_type,
                    ..Candidate::wait(reason)
                };
            }
        };

        if let Err(reason) = validate_direction(signal_type, &entry) {
            tracing::warn!(%signal_type, %reason, "direction invariant violated, degraded to WAIT");
            return Candidate {
                direction: confluence.direction,
                confluence_score: confluence.total_score,
                confluence_factors: confluence.factors.clone(),
                setup_type,
                ..Candidate::wait(reason)
            };
        }

        let strength = strength_from_score(confluence.total_score);
        Candidate {
            signal_type,
            strength,
            direction: confluence.direction,
            confluence_score: confluence.total_score,
            confluence_factors: confluence.factors,
            setup_type,
            entry: Some(entry),
            wait_reason: None,
        }
    }
}

fn strength_from_score(score: i32) -> SignalStrength {
    match score {
        s if s >= 12 => SignalStrength::VeryStrong,
        s if s >= 10 => SignalStrength::Strong,
        s if s >= 7 => SignalStrength::Moderate,
        _ => SignalStrength::Weak,
    }
}

/// The direction invariant: for Buy, sl < entry < tp; for Sell, tp < entry < sl.
pub fn validate_direction(signal_type: SignalType, entry: &EntryDetails) -> Result<(), String> {
    match signal_type {
        SignalType::Buy => {
            if !(entry.stop_loss < entry.entry_price && entry.entry_price < entry.take_profit) {
                return Err(format!(
                    "BUY invariant violated: sl {:.5} entry {:.5} tp {:.5}",
                    entry.stop_loss, entry.entry_price, entry.take_profit
                ));
            }
        }
        SignalType::Sell => {
            if !(entry.take_profit < entry.entry_price && entry.entry_price < entry.stop_loss) {
                return Err(format!(
                    "SELL invariant violated: tp {:.5} entry {:.5} sl {:.5}",
                    entry.take_profit, entry.entry_price, entry.stop_loss
                ));
            }
        }
        SignalType::Wait => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests;

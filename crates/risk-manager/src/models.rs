use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskProfile {
    pub fn params(&self) -> RiskProfileParams {
        match self {
            RiskProfile::Conservative => RiskProfileParams {
                max_position_risk: 0.01,
                max_portfolio_risk: 0.04,
                max_positions: 2,
                min_rr_ratio: 3.0,
            },
            RiskProfile::Moderate => RiskProfileParams {
                max_position_risk: 0.015,
                max_portfolio_risk: 0.06,
                max_positions: 3,
                min_rr_ratio: 2.5,
            },
            RiskProfile::Aggressive => RiskProfileParams {
                max_position_risk: 0.02,
                max_portfolio_risk: 0.10,
                max_positions: 5,
                min_rr_ratio: 2.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskProfileParams {
    /// Fraction of balance risked on one position.
    pub max_position_risk: f64,
    /// Cap on the sum of open position risk fractions.
    pub max_portfolio_risk: f64,
    pub max_positions: usize,
    pub min_rr_ratio: f64,
}

/// Risk attached to one open (or proposed) position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRisk {
    pub symbol: String,
    /// Position size in lots.
    pub position_size: f64,
    pub risk_amount: f64,
    /// Fraction of balance at risk.
    pub risk_percentage: f64,
    pub stop_distance_pips: f64,
    pub correlation_factor: f64,
}

/// Verdict from the risk gates. A refusal is a normal rejection, not an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheck {
    pub can_trade: bool,
    pub reason: String,
}

impl RiskCheck {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            can_trade: true,
            reason: reason.into(),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            can_trade: false,
            reason: reason.into(),
        }
    }
}

use analysis_core::{MarketBias, SignalDirection, TrendDirection};
use market_structure::{BreakKind, MarketStructure};
use serde::{Deserialize, Serialize};
use smart_money::{
    FvgKind, LiquiditySide, OrderBlockKind, SmcAnalysis, SupplyDemandKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceFactor {
    pub factor: String,
    pub score: i32,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confluence {
    pub factors: Vec<ConfluenceFactor>,
    pub total_score: i32,
    pub max_score: i32,
    pub direction: SignalDirection,
}

impl Confluence {
    pub fn has_bos_factor(&self) -> bool {
        self.factors.iter().any(|f| f.factor == "BOS Confirmation")
    }

    pub fn has_structure_break_factor(&self) -> bool {
        self.factors
            .iter()
            .any(|f| f.factor == "BOS Confirmation" || f.factor == "CHOCH Reversal")
    }
}

/// The weighted confluence model, max 15 points.
///
/// Direction is taken from the local timeframe trend; the global bias only
/// adds context to the trend-alignment factor. CHOCH scores as a fallback
/// when no aligned BOS scored, never in parallel.
pub fn score_confluence(
    structure: &MarketStructure,
    smc: &SmcAnalysis,
    current_price: f64,
    market_bias: Option<MarketBias>,
) -> Confluence {
    let mut factors = Vec::new();
    let mut total = 0i32;

    let direction = match structure.trend_direction {
        TrendDirection::Uptrend => SignalDirection::Bullish,
        TrendDirection::Downtrend => SignalDirection::Bearish,
        TrendDirection::Consolidation => SignalDirection::Neutral,
    };
    let directional = direction != SignalDirection::Neutral;

    if directional {
        total += 1;
        factors.push(ConfluenceFactor {
            factor: "Clear Trend Direction".to_string(),
            score: 1,
            details: format!("local trend is {:?}", structure.trend_direction),
        });

        total += 2;
        let details = match market_bias {
            Some(bias @ (MarketBias::Bullish | MarketBias::Bearish)) => {
                format!("market bias is {}", bias)
            }
            _ => format!("local trend alignment ({:?})", structure.trend_direction),
        };
        factors.push(ConfluenceFactor {
            factor: "Trend Alignment".to_string(),
            score: 2,
            details,
        });
    }

    // Structure break: an aligned BOS is the strongest confirmation; a
    // CHOCH only counts when no aligned BOS did.
    let aligned_bos = structure
        .structure_breaks
        .iter()
        .find(|b| b.kind == BreakKind::Bos && b.direction == direction);
    if let Some(bos) = aligned_bos {
        total += 3;
        factors.push(ConfluenceFactor {
            factor: "BOS Confirmation".to_string(),
            score: 3,
            details: format!(
                "break of structure aligned with {:?} (strength {:.2})",
                direction, bos.strength
            ),
        });
    } else if structure
        .structure_breaks
        .iter()
        .any(|b| b.kind == BreakKind::Choch)
    {
        total += 2;
        factors.push(ConfluenceFactor {
            factor: "CHOCH Reversal".to_string(),
            score: 2,
            details: "change of character suggests potential reversal".to_string(),
        });
    }

    // A recent sweep of the opposite side clears the way for this direction.
    if let Some(sweep) = smc.liquidity_sweeps.last() {
        let opposite = match direction {
            SignalDirection::Bullish => sweep.kind.side() == LiquiditySide::Low,
            SignalDirection::Bearish => sweep.kind.side() == LiquiditySide::High,
            SignalDirection::Neutral => false,
        };
        if opposite {
            total += 3;
            factors.push(ConfluenceFactor {
                factor: "Opposite Liquidity Sweep".to_string(),
                score: 3,
                details: format!(
                    "{:?} sweep at {:.5} creates opportunity",
                    sweep.kind, sweep.level
                ),
            });
        }
    }

    // Point of interest: an aligned valid order block, else an aligned
    // FVG less than half mitigated.
    let mut poi = false;
    for ob in &smc.valid_order_blocks {
        let aligned = match direction {
            SignalDirection::Bullish => {
                ob.kind == OrderBlockKind::Bullish && current_price >= ob.bottom
            }
            SignalDirection::Bearish => {
                ob.kind == OrderBlockKind::Bearish && current_price <= ob.top
            }
            SignalDirection::Neutral => false,
        };
        if aligned {
            total += 3;
            factors.push(ConfluenceFactor {
                factor: "Valid OB as POI".to_string(),
                score: 3,
                details: format!("price reacting to a {:?} order block", ob.kind),
            });
            poi = true;
            break;
        }
    }
    if !poi {
        for fvg in &smc.active_fvgs {
            let aligned = match direction {
                SignalDirection::Bullish => {
                    fvg.kind == FvgKind::Bullish && current_price >= fvg.bottom
                }
                SignalDirection::Bearish => {
                    fvg.kind == FvgKind::Bearish && current_price <= fvg.top
                }
                SignalDirection::Neutral => false,
            };
            if aligned && fvg.mitigation_percent < 50.0 {
                total += 3;
                factors.push(ConfluenceFactor {
                    factor: "Valid FVG as POI".to_string(),
                    score: 3,
                    details: format!(
                        "price reacting to a {:?} FVG ({:.0}% mitigated)",
                        fvg.kind, fvg.mitigation_percent
                    ),
                });
                break;
            }
        }
    }

    // Buy in discount, sell in premium.
    if let Some(pd) = &smc.premium_discount {
        let aligned = match direction {
            SignalDirection::Bullish => current_price <= pd.equilibrium,
            SignalDirection::Bearish => current_price >= pd.equilibrium,
            SignalDirection::Neutral => false,
        };
        if aligned {
            total += 2;
            factors.push(ConfluenceFactor {
                factor: "Premium/Discount Alignment".to_string(),
                score: 2,
                details: match direction {
                    SignalDirection::Bullish => "buy signal is in the discount zone".to_string(),
                    _ => "sell signal is in the premium zone".to_string(),
                },
            });
        }
    }

    // No opposing supply/demand zone blocking the path within 0.5%.
    if directional && !opposing_zone_nearby(smc, direction, current_price) {
        total += 2;
        factors.push(ConfluenceFactor {
            factor: "No Opposing S/D Zone".to_string(),
            score: 2,
            details: "no immediate opposing supply/demand zone".to_string(),
        });
    }

    // Entry-timeframe candle pattern: momentum assumption once the setup
    // already scores well on structure.
    if total >= 6 {
        total += 1;
        factors.push(ConfluenceFactor {
            factor: "Entry Candle Pattern".to_string(),
            score: 1,
            details: "momentum/pattern confirmation".to_string(),
        });
    }

    Confluence {
        factors,
        total_score: total,
        max_score: 15,
        direction,
    }
}

fn opposing_zone_nearby(
    smc: &SmcAnalysis,
    direction: SignalDirection,
    current_price: f64,
) -> bool {
    match direction {
        SignalDirection::Bullish => smc.valid_supply_demand.iter().any(|z| {
            z.kind == SupplyDemandKind::Supply
                && z.bottom > current_price
                && (z.bottom - current_price) / current_price < 0.005
        }),
        SignalDirection::Bearish => smc.valid_supply_demand.iter().any(|z| {
            z.kind == SupplyDemandKind::Demand
                && z.top < current_price
                && (current_price - z.top) / current_price < 0.005
        }),
        SignalDirection::Neutral => false,
    }
}

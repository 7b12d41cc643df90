use analysis_core::{price_to_pips, SignalType};
use serde::{Deserialize, Serialize};
use smart_money::{OrderBlock, OrderBlockKind, SmcAnalysis, SupplyDemandKind};

use crate::SetupType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDetails {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub rr_ratio: f64,
    pub risk_pips: f64,
    pub reward_pips: f64,
}

/// Build entry, stop loss and take profit from SMC structure.
///
/// Entry prefers an aligned order block: its 50% equilibrium for pullbacks,
/// 10% beyond its extreme for breakouts; without a block, current price with
/// a 2-pip offset on breakouts. The stop sits beyond the far side of the
/// block plus max(5 pips, 0.1% of entry), never closer than 1% from entry.
/// The target seeks the nearest aligned liquidity level or supply/demand
/// zone at least `min_rr` times the risk away, else falls back to exactly
/// `min_rr` times the risk.
pub fn build_entry(
    signal_type: SignalType,
    current_price: f64,
    smc: &SmcAnalysis,
    setup_type: SetupType,
    min_rr: f64,
) -> Result<EntryDetails, String> {
    let entry_price = entry_price(signal_type, current_price, smc, setup_type);
    let stop_loss = stop_loss(signal_type, entry_price, smc);
    let take_profit = take_profit(signal_type, entry_price, stop_loss, smc, min_rr);

    let (risk, reward) = match signal_type {
        SignalType::Buy => (entry_price - stop_loss, take_profit - entry_price),
        SignalType::Sell => (stop_loss - entry_price, entry_price - take_profit),
        SignalType::Wait => return Err("wait signals have no entry".to_string()),
    };
    if risk <= 0.0 {
        return Err(format!("non-positive risk {:.5}", risk));
    }

    let rr_ratio = reward / risk;
    if rr_ratio < min_rr {
        return Err(format!(
            "risk:reward {:.2} below minimum {:.1}",
            rr_ratio, min_rr
        ));
    }

    Ok(EntryDetails {
        entry_price,
        stop_loss,
        take_profit,
        rr_ratio,
        risk_pips: price_to_pips(risk.abs()),
        reward_pips: price_to_pips(reward.abs()),
    })
}

fn aligned_blocks<'a>(smc: &'a SmcAnalysis, signal_type: SignalType) -> Vec<&'a OrderBlock> {
    let kind = match signal_type {
        SignalType::Buy => OrderBlockKind::Bullish,
        _ => OrderBlockKind::Bearish,
    };
    smc.valid_order_blocks
        .iter()
        .filter(|ob| ob.kind == kind)
        .collect()
}

fn entry_price(
    signal_type: SignalType,
    current_price: f64,
    smc: &SmcAnalysis,
    setup_type: SetupType,
) -> f64 {
    let blocks = aligned_blocks(smc, signal_type);
    let best = blocks.iter().min_by(|a, b| {
        let da = (a.top - current_price).abs();
        let db = (b.top - current_price).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });

    if let Some(ob) = best {
        return match setup_type {
            SetupType::Pullback => (ob.top + ob.bottom) / 2.0,
            SetupType::Breakout => match signal_type {
                SignalType::Buy => ob.top + (ob.top - ob.bottom) * 0.1,
                _ => ob.bottom - (ob.top - ob.bottom) * 0.1,
            },
        };
    }

    // No block: breakouts chase a 2-pip offset, pullbacks take market price.
    match setup_type {
        SetupType::Breakout => {
            let offset = current_price * 0.0002;
            match signal_type {
                SignalType::Buy => current_price + offset,
                _ => current_price - offset,
            }
        }
        SetupType::Pullback => current_price,
    }
}

fn stop_loss(signal_type: SignalType, entry_price: f64, smc: &SmcAnalysis) -> f64 {
    let buffer = (entry_price * 0.001).max(0.0005);
    let blocks = aligned_blocks(smc, signal_type);

    match signal_type {
        SignalType::Buy => {
            // Closest bullish block bottom below entry.
            let target = blocks
                .iter()
                .map(|ob| ob.bottom)
                .filter(|&b| b > 0.0 && b < entry_price)
                .fold(None::<f64>, |acc, b| Some(acc.map_or(b, |v| v.max(b))));

            let sl = match target {
                Some(bottom) => {
                    let sl = bottom - buffer;
                    sl.min(entry_price * 0.99)
                }
                None => entry_price * 0.99,
            };
            if sl >= entry_price {
                entry_price * 0.98
            } else {
                sl
            }
        }
        _ => {
            // Closest bearish block top above entry.
            let target = blocks
                .iter()
                .map(|ob| ob.top)
                .filter(|&t| t > entry_price)
                .fold(None::<f64>, |acc, t| Some(acc.map_or(t, |v| v.min(t))));

            let sl = match target {
                Some(top) => {
                    let sl = top + buffer;
                    sl.max(entry_price * 1.01)
                }
                None => entry_price * 1.01,
            };
            if sl <= entry_price {
                entry_price * 1.02
            } else {
                sl
            }
        }
    }
}

fn take_profit(
    signal_type: SignalType,
    entry_price: f64,
    stop_loss: f64,
    smc: &SmcAnalysis,
    min_rr: f64,
) -> f64 {
    let risk = (entry_price - stop_loss).abs();
    let min_reward = risk * min_rr;

    match signal_type {
        SignalType::Buy => {
            let mut target: Option<f64> = None;
            for level in smc
                .liquidity_zones
                .iter()
                .map(|lz| lz.level)
                .chain(
                    smc.supply_demand_zones
                        .iter()
                        .filter(|z| z.kind == SupplyDemandKind::Supply)
                        .map(|z| z.top),
                )
            {
                if level > entry_price && level - entry_price >= min_reward {
                    target = Some(target.map_or(level, |t: f64| t.min(level)));
                }
            }
            let tp = target.unwrap_or(entry_price + min_reward);
            if tp <= entry_price {
                entry_price + min_reward
            } else {
                tp
            }
        }
        _ => {
            let mut target: Option<f64> = None;
            for level in smc
                .liquidity_zones
                .iter()
                .map(|lz| lz.level)
                .chain(
                    smc.supply_demand_zones
                        .iter()
                        .filter(|z| z.kind == SupplyDemandKind::Demand)
                        .map(|z| z.bottom),
                )
            {
                if level < entry_price && entry_price - level >= min_reward {
                    target = Some(target.map_or(level, |t: f64| t.max(level)));
                }
            }
            let tp = target.unwrap_or(entry_price - min_reward);
            if tp >= entry_price {
                entry_price - min_reward
            } else {
                tp
            }
        }
    }
}

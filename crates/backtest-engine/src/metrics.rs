use analysis_core::SignalType;

use crate::models::{EquityPoint, PerformanceMetrics, Trade};

/// Aggregate trade statistics and risk-adjusted metrics from a finished
/// replay.
pub fn compute_metrics(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    initial_balance: f64,
) -> PerformanceMetrics {
    let mut m = PerformanceMetrics::default();
    if trades.is_empty() {
        return m;
    }

    let pnls: Vec<f64> = trades.iter().filter_map(|t| t.pnl).collect();
    let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();
    let wins_pips: Vec<f64> = trades
        .iter()
        .filter_map(|t| t.pnl_pips)
        .filter(|p| *p > 0.0)
        .collect();
    let losses_pips: Vec<f64> = trades
        .iter()
        .filter_map(|t| t.pnl_pips)
        .filter(|p| *p < 0.0)
        .collect();

    m.total_trades = trades.len();
    m.winning_trades = wins.len();
    m.losing_trades = losses.len();
    m.breakeven_trades = pnls.iter().filter(|p| **p == 0.0).count();
    m.win_rate = wins.len() as f64 / trades.len() as f64 * 100.0;

    m.total_pnl = pnls.iter().sum();
    m.total_pnl_pips = trades.iter().filter_map(|t| t.pnl_pips).sum();
    m.gross_profit = wins.iter().sum();
    m.gross_loss = losses.iter().sum::<f64>().abs();
    m.profit_factor = if m.gross_loss > 0.0 {
        m.gross_profit / m.gross_loss
    } else {
        0.0
    };

    m.expected_payoff = m.total_pnl / trades.len() as f64;
    m.expected_payoff_pips = m.total_pnl_pips / trades.len() as f64;

    m.avg_win = mean(&wins);
    m.avg_loss = mean(&losses).abs();
    m.avg_win_pips = mean(&wins_pips);
    m.avg_loss_pips = mean(&losses_pips).abs();
    m.largest_win = wins.iter().copied().fold(0.0, f64::max);
    m.largest_loss = losses.iter().copied().fold(0.0, f64::min).abs();

    let (dd, dd_pct) = max_drawdown(equity_curve, initial_balance);
    m.max_drawdown = dd;
    m.max_drawdown_pct = dd_pct;

    m.sharpe_ratio = sharpe_ratio(equity_curve);
    m.recovery_factor = if m.max_drawdown > 0.0 {
        m.total_pnl / m.max_drawdown
    } else {
        0.0
    };

    let (max_wins, max_losses) = consecutive_streaks(trades);
    m.max_consecutive_wins = max_wins;
    m.max_consecutive_losses = max_losses;

    let (all, winning, losing) = duration_averages(trades);
    m.avg_trade_duration_secs = all;
    m.avg_winning_duration_secs = winning;
    m.avg_losing_duration_secs = losing;

    m.avg_rr_ratio = avg_realised_rr(trades);
    m.total_commission = trades.iter().map(|t| t.commission).sum();

    m
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Running-peak drawdown in absolute and percentage terms.
fn max_drawdown(equity_curve: &[EquityPoint], initial_balance: f64) -> (f64, f64) {
    let mut peak = initial_balance;
    let mut max_dd = 0.0;
    let mut max_dd_pct = 0.0;
    for point in equity_curve {
        if point.balance > peak {
            peak = point.balance;
        }
        let dd = peak - point.balance;
        if dd > max_dd {
            max_dd = dd;
            max_dd_pct = if peak > 0.0 { dd / peak * 100.0 } else { 0.0 };
        }
    }
    (max_dd, max_dd_pct)
}

/// Annualised Sharpe over per-equity-point returns.
fn sharpe_ratio(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0].balance > 0.0)
        .map(|w| (w[1].balance - w[0].balance) / w[0].balance)
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    let avg = mean(&returns);
    let variance = returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / returns.len() as f64;
    let std = variance.sqrt();
    if std == 0.0 {
        0.0
    } else {
        avg / std * 252.0_f64.sqrt()
    }
}

fn consecutive_streaks(trades: &[Trade]) -> (usize, usize) {
    let mut max_wins = 0;
    let mut max_losses = 0;
    let mut wins = 0;
    let mut losses = 0;
    for trade in trades {
        let Some(pnl) = trade.pnl else { continue };
        if pnl > 0.0 {
            wins += 1;
            losses = 0;
            max_wins = max_wins.max(wins);
        } else if pnl < 0.0 {
            losses += 1;
            wins = 0;
            max_losses = max_losses.max(losses);
        } else {
            wins = 0;
            losses = 0;
        }
    }
    (max_wins, max_losses)
}

fn duration_averages(trades: &[Trade]) -> (Option<i64>, Option<i64>, Option<i64>) {
    let mut all = Vec::new();
    let mut winning = Vec::new();
    let mut losing = Vec::new();
    for trade in trades {
        let (Some(exit), Some(pnl)) = (trade.exit_time, trade.pnl) else {
            continue;
        };
        let secs = (exit - trade.entry_time).num_seconds();
        all.push(secs);
        if pnl > 0.0 {
            winning.push(secs);
        } else if pnl < 0.0 {
            losing.push(secs);
        }
    }
    (avg_secs(&all), avg_secs(&winning), avg_secs(&losing))
}

fn avg_secs(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<i64>() / values.len() as i64)
    }
}

/// Realised reward over initial risk, averaged across closed trades.
fn avg_realised_rr(trades: &[Trade]) -> f64 {
    let mut ratios = Vec::new();
    for trade in trades {
        let Some(exit) = trade.exit_price else { continue };
        let (risk, reward) = match trade.side {
            SignalType::Buy => (
                trade.entry_price - trade.stop_loss,
                exit - trade.entry_price,
            ),
            _ => (
                trade.stop_loss - trade.entry_price,
                trade.entry_price - exit,
            ),
        };
        if risk > 0.0 {
            ratios.push(reward / risk);
        }
    }
    mean(&ratios)
}

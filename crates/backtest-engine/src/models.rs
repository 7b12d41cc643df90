use analysis_core::{SignalType, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_balance: f64,
    /// Commission as a price fraction per unit traded.
    pub commission: f64,
    /// Fraction of balance risked per trade.
    pub risk_per_trade: f64,
    /// Signals below this quality score are skipped.
    pub min_signal_quality: f64,
    pub max_lot: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            commission: 0.00007,
            risk_per_trade: 0.015,
            min_signal_quality: 0.70,
            max_lot: 10.0,
        }
    }
}

/// A precomputed signal to replay: the engine opens a trade when a bar with
/// this exact timestamp arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSignal {
    pub timestamp: DateTime<Utc>,
    pub signal_type: SignalType,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub quality_score: f64,
    pub confluence_score: i32,
    pub timeframe: Option<Timeframe>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfBacktest,
}

/// A backtest trade; append-only once closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub side: SignalType,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Position size in lots.
    pub size: f64,
    pub pnl: Option<f64>,
    pub pnl_pips: Option<f64>,
    pub commission: f64,
    pub status: TradeStatus,
    pub exit_reason: Option<ExitReason>,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
    pub trade_pnl: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    /// Percentage of winning trades.
    pub win_rate: f64,
    pub total_pnl: f64,
    pub total_pnl_pips: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub expected_payoff: f64,
    pub expected_payoff_pips: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub recovery_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub avg_win_pips: f64,
    pub avg_loss_pips: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub avg_trade_duration_secs: Option<i64>,
    pub avg_winning_duration_secs: Option<i64>,
    pub avg_losing_duration_secs: Option<i64>,
    pub avg_rr_ratio: f64,
    pub total_commission: f64,
}

/// Persisted backtest result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub total_signals: usize,
    pub executed_trades: usize,
}

impl BacktestReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_json(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

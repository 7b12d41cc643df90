use std::collections::HashMap;

use analysis_core::{pip_size, price_to_pips, Bar, SignalType};
use chrono::{DateTime, Utc};
use risk_manager::lots_for_risk;

use crate::metrics::compute_metrics;
use crate::models::*;

/// Units per standard lot; PnL = price delta x lots x contract size.
const CONTRACT_SIZE: f64 = 100_000.0;

/// Deterministic bar-by-bar replay of a series against precomputed signals.
///
/// Exits are evaluated before entries on each bar; when a bar crosses both
/// the stop and the target, the trade closes pessimistically at the stop.
pub struct BacktestEngine {
    config: BacktestConfig,
    current_balance: f64,
    peak_balance: f64,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    open_trades: Vec<Trade>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        let balance = config.initial_balance;
        Self {
            config,
            current_balance: balance,
            peak_balance: balance,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            open_trades: Vec::new(),
        }
    }

    pub fn run(
        &mut self,
        symbol: &str,
        bars: &[Bar],
        signals: &[BacktestSignal],
    ) -> BacktestReport {
        self.reset();
        tracing::info!(symbol, bars = bars.len(), signals = signals.len(), "backtest start");

        let mut by_timestamp: HashMap<DateTime<Utc>, Vec<&BacktestSignal>> = HashMap::new();
        for signal in signals {
            by_timestamp.entry(signal.timestamp).or_default().push(signal);
        }

        for bar in bars {
            self.update_trades(symbol, bar);

            if let Some(day_signals) = by_timestamp.get(&bar.timestamp) {
                for signal in day_signals {
                    self.enter_trade(symbol, signal);
                }
            }
        }

        // Whatever is still open closes at the last price.
        if let Some(last) = bars.last() {
            let open: Vec<Trade> = self.open_trades.drain(..).collect();
            for trade in open {
                self.close_trade(trade, last.timestamp, last.close, ExitReason::EndOfBacktest);
            }
        }

        let metrics =
            compute_metrics(&self.trades, &self.equity_curve, self.config.initial_balance);
        tracing::info!(
            symbol,
            trades = self.trades.len(),
            pnl = format!("{:.2}", metrics.total_pnl),
            "backtest complete"
        );

        BacktestReport {
            symbol: symbol.to_string(),
            initial_balance: self.config.initial_balance,
            final_balance: self.current_balance,
            metrics,
            executed_trades: self.trades.len(),
            trades: std::mem::take(&mut self.trades),
            equity_curve: std::mem::take(&mut self.equity_curve),
            total_signals: signals.len(),
        }
    }

    fn reset(&mut self) {
        self.current_balance = self.config.initial_balance;
        self.peak_balance = self.config.initial_balance;
        self.trades.clear();
        self.equity_curve.clear();
        self.open_trades.clear();
    }

    fn enter_trade(&mut self, symbol: &str, signal: &BacktestSignal) {
        if signal.signal_type == SignalType::Wait {
            return;
        }
        if signal.quality_score < self.config.min_signal_quality {
            tracing::debug!(
                quality = signal.quality_score,
                "signal below quality threshold, skipped"
            );
            return;
        }

        // Same direction invariant the live path enforces.
        let valid = match signal.signal_type {
            SignalType::Buy => {
                signal.stop_loss < signal.entry_price && signal.entry_price < signal.take_profit
            }
            SignalType::Sell => {
                signal.take_profit < signal.entry_price && signal.entry_price < signal.stop_loss
            }
            SignalType::Wait => false,
        };
        if !valid {
            tracing::warn!(signal = %signal.signal_type, "signal failed direction invariant, skipped");
            return;
        }

        let risk_amount = self.current_balance * self.config.risk_per_trade;
        let stop_pips =
            (signal.entry_price - signal.stop_loss).abs() / pip_size(symbol);
        let size = lots_for_risk(risk_amount, stop_pips, 10.0, self.config.max_lot);

        self.open_trades.push(Trade {
            entry_time: signal.timestamp,
            exit_time: None,
            side: signal.signal_type,
            entry_price: signal.entry_price,
            exit_price: None,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            size,
            pnl: None,
            pnl_pips: None,
            commission: 0.0,
            status: TradeStatus::Open,
            exit_reason: None,
            quality_score: signal.quality_score,
        });
    }

    fn update_trades(&mut self, _symbol: &str, bar: &Bar) {
        let mut still_open = Vec::with_capacity(self.open_trades.len());
        let open: Vec<Trade> = self.open_trades.drain(..).collect();

        for trade in open {
            let exit = match trade.side {
                SignalType::Buy => {
                    if bar.low <= trade.stop_loss {
                        Some((trade.stop_loss, ExitReason::StopLoss))
                    } else if bar.high >= trade.take_profit {
                        Some((trade.take_profit, ExitReason::TakeProfit))
                    } else {
                        None
                    }
                }
                SignalType::Sell => {
                    if bar.high >= trade.stop_loss {
                        Some((trade.stop_loss, ExitReason::StopLoss))
                    } else if bar.low <= trade.take_profit {
                        Some((trade.take_profit, ExitReason::TakeProfit))
                    } else {
                        None
                    }
                }
                SignalType::Wait => None,
            };

            match exit {
                Some((price, reason)) => {
                    self.close_trade(trade, bar.timestamp, price, reason);
                }
                None => still_open.push(trade),
            }
        }
        self.open_trades = still_open;
    }

    fn close_trade(
        &mut self,
        mut trade: Trade,
        timestamp: DateTime<Utc>,
        exit_price: f64,
        reason: ExitReason,
    ) {
        let delta = match trade.side {
            SignalType::Buy => exit_price - trade.entry_price,
            _ => trade.entry_price - exit_price,
        };
        let mut pnl = delta * trade.size * CONTRACT_SIZE;
        let commission = self.config.commission * trade.size * CONTRACT_SIZE;
        pnl -= commission;

        trade.exit_time = Some(timestamp);
        trade.exit_price = Some(exit_price);
        trade.pnl = Some(pnl);
        trade.pnl_pips = Some(price_to_pips(delta));
        trade.commission = commission;
        trade.status = TradeStatus::Closed;
        trade.exit_reason = Some(reason);

        self.current_balance += pnl;
        if self.current_balance > self.peak_balance {
            self.peak_balance = self.current_balance;
        }
        self.equity_curve.push(EquityPoint {
            timestamp,
            balance: self.current_balance,
            trade_pnl: pnl,
        });

        tracing::debug!(
            side = %trade.side,
            pnl = format!("{:.2}", pnl),
            reason = ?reason,
            "trade closed"
        );
        self.trades.push(trade);
    }
}

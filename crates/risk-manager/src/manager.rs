use std::collections::HashMap;

use analysis_core::pip_size;

use crate::models::{PositionRisk, RiskCheck, RiskProfile, RiskProfileParams};

/// Standard-lot pip value for major pairs, in account currency. The broker
/// adapter can report the real per-symbol value for JPY pairs and exotics.
pub const DEFAULT_PIP_VALUE_PER_LOT: f64 = 10.0;

const MIN_LOT: f64 = 0.01;

/// The sizing rule shared by live trading and the backtest engine: lots =
/// risk amount over pip exposure, rounded to 0.01 and clamped to broker
/// limits. A degenerate stop distance sizes to the minimum lot.
pub fn lots_for_risk(
    risk_amount: f64,
    stop_distance_pips: f64,
    pip_value_per_lot: f64,
    max_lot: f64,
) -> f64 {
    if stop_distance_pips <= 0.0 || pip_value_per_lot <= 0.0 {
        return MIN_LOT;
    }
    let raw = risk_amount / (stop_distance_pips * pip_value_per_lot);
    ((raw * 100.0).round() / 100.0).clamp(MIN_LOT, max_lot)
}
/// Estimated risk fraction per standard lot when syncing broker positions
/// whose original stop is unknown.
const SYNC_RISK_PER_LOT: f64 = 0.015;

/// Owns balance and the open-position risk tally. Mutated only through
/// `add_position` / `remove_position`; the execution loop never touches the
/// tally directly.
pub struct RiskManager {
    profile: RiskProfile,
    params: RiskProfileParams,
    current_balance: f64,
    initial_balance: f64,
    open_positions: HashMap<String, PositionRisk>,
    daily_trade_count: u32,
    max_daily_trades: u32,
    max_trades_per_symbol: usize,
    min_account_balance: f64,
    broker_max_lot: f64,
}

impl RiskManager {
    pub fn new(profile: RiskProfile, balance: f64) -> Self {
        Self {
            profile,
            params: profile.params(),
            current_balance: balance,
            initial_balance: balance,
            open_positions: HashMap::new(),
            daily_trade_count: 0,
            max_daily_trades: 15,
            max_trades_per_symbol: 1,
            min_account_balance: 10.0,
            broker_max_lot: 100.0,
        }
    }

    pub fn with_daily_limit(mut self, max_daily_trades: u32) -> Self {
        self.max_daily_trades = max_daily_trades;
        self
    }

    pub fn with_min_balance(mut self, min_account_balance: f64) -> Self {
        self.min_account_balance = min_account_balance;
        self
    }

    pub fn with_broker_max_lot(mut self, broker_max_lot: f64) -> Self {
        self.broker_max_lot = broker_max_lot;
        self
    }

    /// Override the profile's per-position risk fraction, e.g. from the
    /// `[trading] risk_per_trade` setting.
    pub fn with_position_risk(mut self, risk_fraction: f64) -> Self {
        if risk_fraction > 0.0 {
            self.params.max_position_risk = risk_fraction;
        }
        self
    }

    pub fn profile(&self) -> RiskProfile {
        self.profile
    }

    pub fn params(&self) -> &RiskProfileParams {
        &self.params
    }

    pub fn balance(&self) -> f64 {
        self.current_balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn open_position_count(&self) -> usize {
        self.open_positions.len()
    }

    pub fn daily_trade_count(&self) -> u32 {
        self.daily_trade_count
    }

    /// Sum of open risk fractions. Gated to stay within
    /// `max_portfolio_risk` at all times.
    pub fn open_risk_percentage(&self) -> f64 {
        self.open_positions.values().map(|p| p.risk_percentage).sum()
    }

    pub fn update_balance(&mut self, balance: f64) {
        self.current_balance = balance;
    }

    /// All gates for a prospective position on `symbol`, assuming it would
    /// carry the profile's full per-position risk.
    pub fn can_trade(&self, symbol: &str) -> RiskCheck {
        if self.current_balance < self.min_account_balance {
            return RiskCheck::block(format!(
                "balance ${:.2} below minimum ${:.2}",
                self.current_balance, self.min_account_balance
            ));
        }

        let per_symbol = self.open_positions.keys().filter(|s| *s == symbol).count();
        if per_symbol >= self.max_trades_per_symbol {
            return RiskCheck::block(format!(
                "symbol cap reached ({} open on {})",
                per_symbol, symbol
            ));
        }

        if self.open_positions.len() >= self.params.max_positions {
            return RiskCheck::block(format!(
                "position cap reached ({}/{})",
                self.open_positions.len(),
                self.params.max_positions
            ));
        }

        let projected = self.open_risk_percentage() + self.params.max_position_risk;
        if projected > self.params.max_portfolio_risk + 1e-9 {
            return RiskCheck::block(format!(
                "portfolio risk would exceed {:.1}% ({:.1}% open + {:.1}% new)",
                self.params.max_portfolio_risk * 100.0,
                self.open_risk_percentage() * 100.0,
                self.params.max_position_risk * 100.0
            ));
        }

        if self.daily_trade_count >= self.max_daily_trades {
            return RiskCheck::block(format!(
                "daily trade limit reached ({})",
                self.daily_trade_count
            ));
        }

        RiskCheck::allow("all risk gates passed")
    }

    /// Position size from balance, per-position risk and stop distance,
    /// using the default $10/pip/lot simplification.
    pub fn calculate_position_size(
        &self,
        symbol: &str,
        entry_price: f64,
        stop_loss: f64,
    ) -> (f64, PositionRisk) {
        self.calculate_position_size_with(symbol, entry_price, stop_loss, DEFAULT_PIP_VALUE_PER_LOT)
    }

    /// Same sizing rule with a broker-reported pip value, so JPY pairs and
    /// exotics size correctly.
    pub fn calculate_position_size_with(
        &self,
        symbol: &str,
        entry_price: f64,
        stop_loss: f64,
        pip_value_per_lot: f64,
    ) -> (f64, PositionRisk) {
        let risk_amount = self.current_balance * self.params.max_position_risk;
        let stop_distance_pips = (entry_price - stop_loss).abs() / pip_size(symbol);
        let lots = lots_for_risk(
            risk_amount,
            stop_distance_pips,
            pip_value_per_lot,
            self.broker_max_lot,
        );

        let actual_risk = lots * stop_distance_pips * pip_value_per_lot;
        let risk_percentage = if self.current_balance > 0.0 {
            actual_risk / self.current_balance
        } else {
            0.0
        };

        let position_risk = PositionRisk {
            symbol: symbol.to_string(),
            position_size: lots,
            risk_amount: actual_risk,
            risk_percentage,
            stop_distance_pips,
            correlation_factor: 1.0,
        };
        (lots, position_risk)
    }

    /// Register an opened position's risk. Returns false (and leaves the
    /// tally untouched) if it would push the portfolio over its cap.
    pub fn add_position(&mut self, position: PositionRisk) -> bool {
        if self.open_risk_percentage() + position.risk_percentage
            > self.params.max_portfolio_risk + 1e-9
        {
            tracing::warn!(
                symbol = %position.symbol,
                risk = position.risk_percentage,
                "position refused: portfolio risk cap"
            );
            return false;
        }
        self.daily_trade_count += 1;
        tracing::info!(
            symbol = %position.symbol,
            lots = position.position_size,
            risk_pct = format!("{:.2}%", position.risk_percentage * 100.0),
            "position risk registered"
        );
        self.open_positions.insert(position.symbol.clone(), position);
        true
    }

    pub fn remove_position(&mut self, symbol: &str) -> Option<PositionRisk> {
        let removed = self.open_positions.remove(symbol);
        if removed.is_some() {
            tracing::info!(symbol, "position risk released");
        }
        removed
    }

    /// Seed broker-reported positions at startup. Without the original
    /// stop, risk is estimated from position size.
    pub fn sync_position(&mut self, symbol: &str, lots: f64) {
        let risk_percentage = lots * SYNC_RISK_PER_LOT;
        let position = PositionRisk {
            symbol: symbol.to_string(),
            position_size: lots,
            risk_amount: self.current_balance * risk_percentage,
            risk_percentage,
            stop_distance_pips: 100.0,
            correlation_factor: 1.0,
        };
        self.open_positions.insert(symbol.to_string(), position);
    }

    pub fn reset_daily_counts(&mut self) {
        self.daily_trade_count = 0;
    }
}

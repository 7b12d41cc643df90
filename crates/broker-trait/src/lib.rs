use analysis_core::{Bar, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Unified broker types (broker-agnostic)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: i64,
    pub balance: Decimal,
    pub equity: Decimal,
    pub currency: String,
}

impl AccountInfo {
    pub fn balance_f64(&self) -> f64 {
        self.balance.to_f64().unwrap_or(0.0)
    }

    pub fn equity_f64(&self) -> f64 {
        self.equity.to_f64().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// Current spread in pips.
    pub spread_pips: f64,
    /// Smallest price increment.
    pub point: f64,
    pub digits: u32,
    pub volume_min: f64,
    pub volume_max: f64,
    /// Broker minimum stop distance, in points.
    pub trade_stops_level: u32,
    /// Pip value per standard lot in account currency. $10 for majors; the
    /// adapter corrects JPY pairs and exotics.
    pub pip_value_per_lot: f64,
}

impl SymbolInfo {
    /// Minimum stop distance as a price delta.
    pub fn min_stop_distance(&self) -> f64 {
        self.trade_stops_level as f64 * self.point
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("BUY"),
            OrderSide::Sell => f.write_str("SELL"),
        }
    }
}

/// One code path per order kind: market now, or pending at a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Stop,
    Limit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub volume: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Permitted slippage, in points.
    pub deviation_points: u32,
    pub magic_number: u64,
    pub comment: String,
}

/// Order accepted by the broker.
pub const RETCODE_DONE: u32 = 10009;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub retcode: u32,
    pub order_id: u64,
    pub fill_price: f64,
    pub fill_volume: f64,
}

impl OrderResult {
    pub fn is_done(&self) -> bool {
        self.retcode == RETCODE_DONE
    }
}

/// An open position as reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub ticket: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: f64,
    pub open_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub open_time: DateTime<Utc>,
    pub profit: f64,
    pub magic_number: u64,
    pub comment: String,
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("invalid stops")]
    InvalidStops,
    #[error("invalid volume")]
    InvalidVolume,
    #[error("market closed")]
    MarketClosed,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("price changed")]
    PriceChanged,
    #[error("requote")]
    Requote,
    #[error("request rejected")]
    Rejected,
    #[error("invalid price")]
    InvalidPrice,
    #[error("invalid fill")]
    InvalidFill,
    #[error("too many requests")]
    TooManyRequests,
    #[error("request timed out")]
    Timeout,
    #[error("not connected")]
    NotConnected,
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("no bars returned for {0}")]
    NoData(String),
    #[error("broker error code {0}")]
    Unknown(u32),
}

impl BrokerError {
    /// Classify a terminal return code. `None` for success.
    pub fn from_retcode(retcode: u32) -> Option<Self> {
        match retcode {
            RETCODE_DONE => None,
            10004 => Some(BrokerError::Requote),
            10006 => Some(BrokerError::Rejected),
            10014 => Some(BrokerError::InvalidVolume),
            10015 => Some(BrokerError::InvalidPrice),
            10016 => Some(BrokerError::InvalidStops),
            10018 => Some(BrokerError::MarketClosed),
            10019 => Some(BrokerError::InsufficientFunds),
            10020 => Some(BrokerError::PriceChanged),
            10024 => Some(BrokerError::TooManyRequests),
            10030 => Some(BrokerError::InvalidFill),
            other => Some(BrokerError::Unknown(other)),
        }
    }

    /// Whether the same request could plausibly succeed later without
    /// modification. Informational only; orders are never retried
    /// automatically.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::Requote
                | BrokerError::PriceChanged
                | BrokerError::TooManyRequests
                | BrokerError::Timeout
                | BrokerError::MarketClosed
        )
    }
}

// ---------------------------------------------------------------------------
// Broker trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Establish (or reuse) the terminal connection.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Account balance, equity and login.
    async fn account_info(&self) -> Result<AccountInfo, BrokerError>;

    /// Static and current per-symbol details.
    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, BrokerError>;

    /// Latest bid/ask.
    async fn tick(&self, symbol: &str) -> Result<Tick, BrokerError>;

    /// The most recent `count` bars for a symbol and timeframe, oldest
    /// first.
    async fn rates(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, BrokerError>;

    /// Submit an order. A non-done retcode is returned as a classified
    /// error.
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, BrokerError>;

    /// All open positions.
    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Release the terminal connection.
    async fn shutdown(&self) -> Result<(), BrokerError>;

    /// Whether this adapter serves synthetic offline data.
    fn is_offline(&self) -> bool;

    /// Broker name for logging.
    fn broker_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retcode_classification_covers_the_terminal_table() {
        assert_eq!(BrokerError::from_retcode(RETCODE_DONE), None);
        assert_eq!(
            BrokerError::from_retcode(10016),
            Some(BrokerError::InvalidStops)
        );
        assert_eq!(
            BrokerError::from_retcode(10019),
            Some(BrokerError::InsufficientFunds)
        );
        assert_eq!(
            BrokerError::from_retcode(10004),
            Some(BrokerError::Requote)
        );
        assert_eq!(
            BrokerError::from_retcode(99999),
            Some(BrokerError::Unknown(99999))
        );
    }

    #[test]
    fn transient_errors_are_flagged() {
        assert!(BrokerError::Requote.is_transient());
        assert!(BrokerError::Timeout.is_transient());
        assert!(!BrokerError::InvalidStops.is_transient());
        assert!(!BrokerError::InsufficientFunds.is_transient());
    }

    #[test]
    fn min_stop_distance_derives_from_points() {
        let info = SymbolInfo {
            symbol: "EURUSD".to_string(),
            bid: 1.0999,
            ask: 1.1001,
            spread_pips: 2.0,
            point: 0.00001,
            digits: 5,
            volume_min: 0.01,
            volume_max: 100.0,
            trade_stops_level: 100,
            pip_value_per_lot: 10.0,
        };
        assert!((info.min_stop_distance() - 0.001).abs() < 1e-12);
    }
}

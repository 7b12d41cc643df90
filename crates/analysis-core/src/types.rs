use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// OHLCV bar data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Supported trading timeframes, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
    W1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
            Timeframe::W1 => 10080,
        }
    }

    /// Duration represented by one bar
    pub fn to_duration(&self) -> Duration {
        Duration::minutes(self.to_minutes())
    }

    /// Priority order: higher number = higher timeframe.
    pub fn priority(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 2,
            Timeframe::M15 => 3,
            Timeframe::H1 => 4,
            Timeframe::H4 => 5,
            Timeframe::D1 => 6,
            Timeframe::W1 => 7,
        }
    }

    /// Weight used for trend aggregation across timeframes.
    /// H4 carries half the vote, H1 30%, M15 20%; D1 dominates when present.
    pub fn weight(&self) -> f64 {
        match self {
            Timeframe::M1 => 0.05,
            Timeframe::M5 => 0.1,
            Timeframe::M15 => 0.2,
            Timeframe::H1 => 0.3,
            Timeframe::H4 => 0.5,
            Timeframe::D1 => 0.6,
            Timeframe::W1 => 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Timeframe {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            "W1" => Ok(Timeframe::W1),
            other => Err(AnalysisError::UnknownTimeframe(other.to_string())),
        }
    }
}

/// Trade action emitted by the signal pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Buy,
    Sell,
    Wait,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Buy => f.write_str("BUY"),
            SignalType::Sell => f.write_str("SELL"),
            SignalType::Wait => f.write_str("WAIT"),
        }
    }
}

/// Directional lean of a candidate before it hardens into a SignalType.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl SignalDirection {
    pub fn matches(&self, signal: SignalType) -> bool {
        matches!(
            (self, signal),
            (SignalDirection::Bullish, SignalType::Buy)
                | (SignalDirection::Bearish, SignalType::Sell)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl SignalStrength {
    /// Multiplier used when weighting per-timeframe signals.
    pub fn multiplier(&self) -> u32 {
        match self {
            SignalStrength::Weak => 1,
            SignalStrength::Moderate => 2,
            SignalStrength::Strong => 3,
            SignalStrength::VeryStrong => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Uptrend,
    Downtrend,
    Consolidation,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Uptrend => f.write_str("uptrend"),
            TrendDirection::Downtrend => f.write_str("downtrend"),
            TrendDirection::Consolidation => f.write_str("consolidation"),
        }
    }
}

/// Top-down market bias from the HTF -> MTF rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketBias {
    Bullish,
    Bearish,
    Neutral,
    Conflict,
}

impl fmt::Display for MarketBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketBias::Bullish => f.write_str("BULLISH"),
            MarketBias::Bearish => f.write_str("BEARISH"),
            MarketBias::Neutral => f.write_str("NEUTRAL"),
            MarketBias::Conflict => f.write_str("CONFLICT"),
        }
    }
}

/// Pip size for a symbol: 0.01 for JPY crosses, 0.0001 otherwise.
pub fn pip_size(symbol: &str) -> f64 {
    if symbol.to_ascii_uppercase().contains("JPY") {
        0.01
    } else {
        0.0001
    }
}

/// Convert a raw price delta into pips for a non-JPY major.
pub fn price_to_pips(delta: f64) -> f64 {
    delta * 10_000.0
}

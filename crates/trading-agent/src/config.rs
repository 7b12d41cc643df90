use std::path::Path;
use std::str::FromStr;

use analysis_core::Timeframe;
use risk_manager::RiskProfile;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingSettings {
    /// Comma-separated symbol list.
    pub symbols: String,
    /// Comma-separated timeframe list (M1..W1).
    pub timeframes: String,
    pub risk_per_trade: f64,
    /// Widest acceptable spread, in pips.
    pub max_spread: f64,
    pub atr_length: usize,
    pub atr_multiplier: f64,
    pub news_impact_level: String,
    pub min_volume_ratio: f64,
}

impl TradingSettings {
    pub fn symbol_list(&self) -> Vec<String> {
        self.symbols
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn timeframe_list(&self) -> Result<Vec<Timeframe>, ConfigError> {
        self.timeframes
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                Timeframe::from_str(s).map_err(|_| invalid("trading.timeframes", s.trim()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSettings {
    pub swing_length: usize,
    pub fvg_min_size: f64,
    pub order_block_lookback: usize,
    pub liquidity_threshold: f64,
    pub swing_point_lookback: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualitySettings {
    pub min_confluence_score: i32,
    pub min_rr_ratio: f64,
    pub enable_quality_analysis: bool,
    pub enable_logging: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestSettings {
    pub initial_balance: f64,
    /// Commission as a price fraction.
    pub commission: f64,
    pub start_date: String,
    pub end_date: String,
}

/// Broker credentials; "auto" reuses an existing terminal session.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    pub login: String,
    pub password: String,
    pub server: String,
}

impl BrokerSettings {
    pub fn login_id(&self) -> Result<Option<i64>, ConfigError> {
        let raw = self.login.trim();
        if raw.eq_ignore_ascii_case("auto") || raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<i64>()
            .map(Some)
            .map_err(|_| invalid("broker.login", "expected an integer or \"auto\""))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Seconds between scans.
    pub scan_interval_secs: u64,
    pub max_daily_trades: u32,
    pub risk_profile: RiskProfile,
    pub magic_number: u64,
    pub slippage_pips: f64,
    /// Signal-only mode when false.
    pub enable_execution: bool,
    pub min_account_balance: f64,
    /// Bars requested per timeframe on each scan.
    pub bars_per_scan: usize,
    pub session_dir: String,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 300,
            max_daily_trades: 15,
            risk_profile: RiskProfile::Aggressive,
            magic_number: 142_536,
            slippage_pips: 1.0,
            enable_execution: true,
            min_account_balance: 10.0,
            bars_per_scan: 300,
            session_dir: "sessions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub trading: TradingSettings,
    pub analysis: AnalysisSettings,
    pub quality: QualitySettings,
    pub backtest: BacktestSettings,
    pub broker: BrokerSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading.symbol_list().is_empty() {
            return Err(invalid("trading.symbols", "at least one symbol required"));
        }
        let timeframes = self.trading.timeframe_list()?;
        if timeframes.is_empty() {
            return Err(invalid("trading.timeframes", "at least one timeframe required"));
        }
        if !(0.0..1.0).contains(&self.trading.risk_per_trade) {
            return Err(invalid("trading.risk_per_trade", "expected a fraction in (0, 1)"));
        }
        if self.quality.min_rr_ratio <= 0.0 {
            return Err(invalid("quality.min_rr_ratio", "must be positive"));
        }
        if self.backtest.initial_balance <= 0.0 {
            return Err(invalid("backtest.initial_balance", "must be positive"));
        }
        for (field, value) in [
            ("backtest.start_date", &self.backtest.start_date),
            ("backtest.end_date", &self.backtest.end_date),
        ] {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|_| invalid(field, "expected YYYY-MM-DD"))?;
        }
        match self.trading.news_impact_level.as_str() {
            "low" | "medium" | "high" => {}
            other => return Err(invalid("trading.news_impact_level", other)),
        }
        self.broker.login_id()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[trading]
symbols = "EURUSD, GBPUSD"
timeframes = "H4, H1, M15"
risk_per_trade = 0.01
max_spread = 3.0
atr_length = 14
atr_multiplier = 2.5
news_impact_level = "high"
min_volume_ratio = 0.75

[analysis]
swing_length = 15
fvg_min_size = 5.0
order_block_lookback = 20
liquidity_threshold = 0.002
swing_point_lookback = 50

[quality]
min_confluence_score = 7
min_rr_ratio = 2.0
enable_quality_analysis = true
enable_logging = true

[backtest]
initial_balance = 10000.0
commission = 0.00007
start_date = "2024-01-01"
end_date = "2024-06-01"

[broker]
login = "auto"
password = "auto"
server = "auto"
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn sample_config_parses_and_validates() {
        let file = write_config(SAMPLE);
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.trading.symbol_list(), vec!["EURUSD", "GBPUSD"]);
        assert_eq!(
            config.trading.timeframe_list().unwrap(),
            vec![Timeframe::H4, Timeframe::H1, Timeframe::M15]
        );
        assert_eq!(config.broker.login_id().unwrap(), None);
        // Defaults kick in for the optional [execution] section.
        assert_eq!(config.execution.scan_interval_secs, 300);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = EngineConfig::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn bad_timeframe_is_rejected() {
        let broken = SAMPLE.replace("\"H4, H1, M15\"", "\"H4, X7\"");
        let file = write_config(&broken);
        let err = EngineConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("timeframes"));
    }

    #[test]
    fn numeric_login_parses() {
        let with_login = SAMPLE.replace("login = \"auto\"", "login = \"12345678\"");
        let file = write_config(&with_login);
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.broker.login_id().unwrap(), Some(12345678));
    }

    #[test]
    fn bad_date_is_rejected() {
        let broken = SAMPLE.replace("2024-01-01", "01/01/2024");
        let file = write_config(&broken);
        assert!(EngineConfig::load(file.path()).is_err());
    }
}

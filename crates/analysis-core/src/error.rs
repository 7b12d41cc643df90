use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Out-of-order bar for {symbol} {timeframe}: {timestamp} <= last {last}")]
    OutOfOrderBar {
        symbol: String,
        timeframe: String,
        timestamp: String,
        last: String,
    },

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),
}

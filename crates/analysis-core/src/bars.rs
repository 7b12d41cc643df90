use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::AnalysisError;
use crate::types::{Bar, Timeframe};

/// Owns per-(symbol, timeframe) ordered OHLCV series.
///
/// Append-only: timestamps must be strictly increasing within a series.
/// Gaps in source data are accepted as-is; nothing is synthesised.
#[derive(Debug, Default)]
pub struct BarStore {
    series: HashMap<(String, Timeframe), Vec<Bar>>,
}

impl BarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        bar: Bar,
    ) -> Result<(), AnalysisError> {
        let key = (symbol.to_string(), timeframe);
        let bars = self.series.entry(key).or_default();
        if let Some(last) = bars.last() {
            if bar.timestamp <= last.timestamp {
                return Err(AnalysisError::OutOfOrderBar {
                    symbol: symbol.to_string(),
                    timeframe: timeframe.name().to_string(),
                    timestamp: bar.timestamp.to_rfc3339(),
                    last: last.timestamp.to_rfc3339(),
                });
            }
        }
        bars.push(bar);
        Ok(())
    }

    pub fn extend(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        bars: impl IntoIterator<Item = Bar>,
    ) -> Result<usize, AnalysisError> {
        let mut appended = 0;
        for bar in bars {
            self.append(symbol, timeframe, bar)?;
            appended += 1;
        }
        Ok(appended)
    }

    pub fn series(&self, symbol: &str, timeframe: Timeframe) -> &[Bar] {
        self.series
            .get(&(symbol.to_string(), timeframe))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Up to `n` bars with timestamp <= `t`, in chronological order.
    pub fn window_ending_at(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        t: DateTime<Utc>,
        n: usize,
    ) -> &[Bar] {
        let bars = self.series(symbol, timeframe);
        let end = bars.partition_point(|b| b.timestamp <= t);
        let start = end.saturating_sub(n);
        &bars[start..end]
    }

    /// The most recent `n` bars, in chronological order.
    pub fn latest(&self, symbol: &str, timeframe: Timeframe, n: usize) -> &[Bar] {
        let bars = self.series(symbol, timeframe);
        let start = bars.len().saturating_sub(n);
        &bars[start..]
    }

    pub fn len(&self, symbol: &str, timeframe: Timeframe) -> usize {
        self.series(symbol, timeframe).len()
    }

    pub fn is_empty(&self, symbol: &str, timeframe: Timeframe) -> bool {
        self.len(symbol, timeframe) == 0
    }
}

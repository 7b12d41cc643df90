use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row per evaluated signal in the structured signal log.
#[derive(Debug, Clone, Serialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: String,
    pub action: String,
    pub confidence: String,
    pub confidence_score: f64,
    pub confluence_score: i32,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
    pub executed: bool,
    pub notes: String,
}

/// One row per submitted order in the trade log.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: String,
    pub order_kind: String,
    pub volume: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub order_id: u64,
    pub comment: String,
}

/// Session counters, persisted as the summary JSON at shutdown.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub cycles_run: u64,
    pub signals_generated: u64,
    pub signals_executed: u64,
    pub trades_opened: u64,
    pub rejections_quality: u64,
    pub rejections_risk: u64,
    pub rejections_external: u64,
    pub rejections_broker: u64,
    pub duplicate_signals: u64,
    pub errors: u64,
}

#[derive(Debug, Serialize)]
struct SessionSummary<'a> {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: &'a SessionStats,
}

/// Writes the per-session artefacts: signal CSV, trade CSV, summary JSON.
pub struct SessionLogger {
    dir: PathBuf,
    started_at: DateTime<Utc>,
    signal_writer: csv::Writer<std::fs::File>,
    trade_writer: csv::Writer<std::fs::File>,
    pub stats: SessionStats,
}

impl SessionLogger {
    pub fn new(base_dir: &Path) -> Result<Self> {
        let started_at = Utc::now();
        let dir = base_dir.join(started_at.format("session_%Y%m%d_%H%M%S").to_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating session directory {}", dir.display()))?;

        let signal_writer = csv::Writer::from_path(dir.join("signals.csv"))
            .context("opening signal log")?;
        let trade_writer =
            csv::Writer::from_path(dir.join("trades.csv")).context("opening trade log")?;

        Ok(Self {
            dir,
            started_at,
            signal_writer,
            trade_writer,
            stats: SessionStats::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_signal(&mut self, record: &SignalRecord) {
        self.stats.signals_generated += 1;
        if record.executed {
            self.stats.signals_executed += 1;
        }
        if let Err(e) = self.signal_writer.serialize(record) {
            tracing::warn!(error = %e, "failed to write signal log row");
        }
        let _ = self.signal_writer.flush();
    }

    pub fn log_trade(&mut self, record: &TradeRecord) {
        self.stats.trades_opened += 1;
        if let Err(e) = self.trade_writer.serialize(record) {
            tracing::warn!(error = %e, "failed to write trade log row");
        }
        let _ = self.trade_writer.flush();
    }

    /// Write the summary JSON. Called once at shutdown.
    pub fn finalize(&mut self) -> Result<()> {
        let summary = SessionSummary {
            started_at: self.started_at,
            finished_at: Utc::now(),
            stats: &self.stats,
        };
        let path = self.dir.join("summary.json");
        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing {}", path.display()))?;
        self.signal_writer.flush()?;
        self.trade_writer.flush()?;
        tracing::info!(dir = %self.dir.display(), "session artefacts written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(executed: bool) -> SignalRecord {
        SignalRecord {
            timestamp: Utc::now(),
            symbol: "EURUSD".to_string(),
            timeframe: "M15".to_string(),
            action: "BUY".to_string(),
            confidence: "high".to_string(),
            confidence_score: 0.9,
            confluence_score: 9,
            entry_price: 1.1,
            stop_loss: 1.09,
            take_profit: 1.12,
            risk_reward_ratio: 2.0,
            executed,
            notes: "test".to_string(),
        }
    }

    #[test]
    fn session_artefacts_are_written() {
        let tmp = tempfile::tempdir().unwrap();
        let mut logger = SessionLogger::new(tmp.path()).unwrap();
        logger.log_signal(&signal(true));
        logger.log_signal(&signal(false));
        logger.log_trade(&TradeRecord {
            timestamp: Utc::now(),
            symbol: "EURUSD".to_string(),
            action: "BUY".to_string(),
            order_kind: "market".to_string(),
            volume: 0.1,
            price: 1.1,
            stop_loss: 1.09,
            take_profit: 1.12,
            order_id: 1,
            comment: "SMC_BUY".to_string(),
        });
        logger.stats.rejections_risk += 1;
        logger.finalize().unwrap();

        assert_eq!(logger.stats.signals_generated, 2);
        assert_eq!(logger.stats.signals_executed, 1);
        assert_eq!(logger.stats.trades_opened, 1);

        let signals = std::fs::read_to_string(logger.dir().join("signals.csv")).unwrap();
        assert!(signals.lines().count() >= 3); // header + 2 rows
        assert!(signals.contains("EURUSD"));

        let summary = std::fs::read_to_string(logger.dir().join("summary.json")).unwrap();
        assert!(summary.contains("\"rejections_risk\": 1"));
    }
}

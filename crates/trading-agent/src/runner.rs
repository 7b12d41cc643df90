use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{Bar, SignalType, Timeframe};
use anyhow::{Context, Result};
use broker_trait::BrokerClient;
use chrono::{NaiveDate, Utc};
use multi_timeframe::{BiasDecision, BiasFilter, MtfAnalysis, MtfSettings, Recommendation};
use quality_filter::{QualityFilterConfig, SignalQualityFilter};
use risk_manager::RiskManager;

use crate::config::EngineConfig;
use crate::executor::{OrderOutcome, TradeExecutor};
use crate::external::ExternalConditionFilter;
use crate::scanner::MarketScanner;
use crate::session::{SessionLogger, SignalRecord, TradeRecord};

/// Shutdown chunks: the loop re-checks the flag at least this often.
const SLEEP_CHUNK: Duration = Duration::from_secs(10);
/// Back-off after a failed cycle.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Bound on account and position round-trips.
const BROKER_TIMEOUT: Duration = Duration::from_secs(15);

pub fn mtf_settings(config: &EngineConfig) -> MtfSettings {
    MtfSettings {
        swing_length: config.analysis.swing_length,
        fvg_min_size: config.analysis.fvg_min_size,
        order_block_lookback: config.analysis.order_block_lookback,
        liquidity_threshold: config.analysis.liquidity_threshold,
        swing_point_lookback: config.analysis.swing_point_lookback,
        min_confluence_score: config.quality.min_confluence_score,
        min_rr_ratio: config.quality.min_rr_ratio,
        atr_length: config.trading.atr_length,
        atr_multiplier: config.trading.atr_multiplier,
        ..MtfSettings::default()
    }
}

/// The live execution loop. Owns every piece of mutable core state: the
/// bar store (inside the scanner), the risk tally, and the processed-signal
/// set. Everything runs on one task; only broker calls suspend.
pub struct TradingEngine {
    config: EngineConfig,
    symbols: Vec<String>,
    broker: Arc<dyn BrokerClient>,
    scanner: MarketScanner,
    quality: SignalQualityFilter,
    risk: RiskManager,
    executor: TradeExecutor,
    external: ExternalConditionFilter,
    session: SessionLogger,
    processed_signals: HashSet<String>,
    last_trade_date: NaiveDate,
    shutdown: Arc<AtomicBool>,
}

impl TradingEngine {
    pub fn new(
        config: EngineConfig,
        broker: Arc<dyn BrokerClient>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let symbols = config.trading.symbol_list();
        let timeframes = config.trading.timeframe_list().context("timeframes")?;

        let scanner = MarketScanner::new(
            broker.clone(),
            timeframes,
            mtf_settings(&config),
            config.execution.bars_per_scan,
        );
        let quality = SignalQualityFilter::new(QualityFilterConfig {
            min_rr_ratio: config.quality.min_rr_ratio,
            ..QualityFilterConfig::default()
        });
        let risk = RiskManager::new(config.execution.risk_profile, 0.0)
            .with_position_risk(config.trading.risk_per_trade)
            .with_daily_limit(config.execution.max_daily_trades)
            .with_min_balance(config.execution.min_account_balance);
        let executor = TradeExecutor::new(
            broker.clone(),
            config.execution.magic_number,
            config.execution.slippage_pips,
        );
        let external = ExternalConditionFilter::new(
            config.trading.max_spread,
            config.trading.min_volume_ratio,
            config.trading.news_impact_level.clone(),
        );
        let session = SessionLogger::new(Path::new(&config.execution.session_dir))?;

        Ok(Self {
            config,
            symbols,
            broker,
            scanner,
            quality,
            risk,
            executor,
            external,
            session,
            processed_signals: HashSet::new(),
            last_trade_date: Utc::now().date_naive(),
            shutdown,
        })
    }

    /// Startup, then the tick loop until shutdown is requested.
    pub async fn run(&mut self) -> Result<()> {
        self.startup().await?;
        tracing::info!(
            broker = self.broker.broker_name(),
            balance = self.risk.balance(),
            symbols = self.symbols.len(),
            interval = self.config.execution.scan_interval_secs,
            "live execution started"
        );

        // Seed existing broker positions into the risk tally.
        match self.broker.positions().await {
            Ok(positions) => {
                for p in &positions {
                    self.risk.sync_position(&p.symbol, p.volume);
                }
                if !positions.is_empty() {
                    tracing::info!(count = positions.len(), "synced existing positions");
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not sync existing positions"),
        }

        while !self.shutdown.load(Ordering::SeqCst) {
            self.session.stats.cycles_run += 1;
            if let Err(e) = self.run_cycle().await {
                self.session.stats.errors += 1;
                tracing::error!(error = %e, "cycle failed, backing off");
                self.sleep_with_shutdown(ERROR_BACKOFF).await;
            }
            self.sleep_with_shutdown(Duration::from_secs(
                self.config.execution.scan_interval_secs,
            ))
            .await;
        }

        tracing::info!("shutdown requested, finalising session");
        self.session.finalize()?;
        self.broker.shutdown().await.ok();
        Ok(())
    }

    /// One tick of the loop: counters, balance refresh, position
    /// management, then the per-symbol scan/filter/size/submit chain.
    pub async fn run_cycle(&mut self) -> Result<()> {
        // New trading day resets the daily counters.
        let today = Utc::now().date_naive();
        if today != self.last_trade_date {
            self.risk.reset_daily_counts();
            self.last_trade_date = today;
            tracing::info!(%today, "new trading day");
        }

        let account = tokio::time::timeout(BROKER_TIMEOUT, self.broker.account_info())
            .await
            .map_err(|_| broker_trait::BrokerError::Timeout)
            .context("account refresh")?
            .context("account refresh")?;
        self.risk.update_balance(account.balance_f64());

        self.manage_open_positions().await;

        if self.risk.daily_trade_count() >= self.config.execution.max_daily_trades {
            tracing::info!(
                count = self.risk.daily_trade_count(),
                "daily trade limit reached, monitoring only"
            );
            return Ok(());
        }

        for symbol in self.symbols.clone() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.process_symbol(&symbol).await {
                // Data or analysis failure on one symbol never stops the
                // iteration over the rest.
                self.session.stats.errors += 1;
                tracing::warn!(symbol = %symbol, error = %e, "symbol skipped this cycle");
            }
        }
        Ok(())
    }

    /// Broker-side position sync: release risk for positions the broker no
    /// longer reports. Trailing-stop management hooks in here later.
    async fn manage_open_positions(&mut self) {
        let positions = tokio::time::timeout(BROKER_TIMEOUT, self.broker.positions())
            .await
            .unwrap_or(Err(broker_trait::BrokerError::Timeout));
        match positions {
            Ok(positions) => {
                let open_symbols: HashSet<&str> =
                    positions.iter().map(|p| p.symbol.as_str()).collect();
                let tracked: Vec<String> = self.symbols.clone();
                for symbol in tracked {
                    if !open_symbols.contains(symbol.as_str()) {
                        self.risk.remove_position(&symbol);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "position sync failed"),
        }
    }

    async fn process_symbol(&mut self, symbol: &str) -> Result<()> {
        let analysis = self.scanner.scan(symbol).await?;
        let rec = &analysis.recommendation;

        if rec.action == SignalType::Wait {
            tracing::debug!(symbol, "no actionable recommendation");
            return Ok(());
        }
        let mut record = signal_record(symbol, rec);

        // Quality gate.
        if self.config.quality.enable_quality_analysis {
            let decision = self.quality.should_execute(symbol, rec);
            if !decision.execute {
                self.session.stats.rejections_quality += 1;
                record.notes = decision.reason.clone();
                self.record_signal(&record);
                tracing::info!(symbol, reason = %decision.reason, "rejected by quality filter");
                return Ok(());
            }
        }

        // Bias gate.
        let (bias_decision, bias_score, bias_reason) = BiasFilter::assess_signal_confidence(
            rec.action,
            rec.market_bias,
            rec.confluence_count,
            rec.total_signal_score,
        );
        if bias_decision != BiasDecision::Execute {
            self.session.stats.rejections_quality += 1;
            record.notes = format!("bias gate: {} ({:.1})", bias_reason, bias_score);
            self.record_signal(&record);
            tracing::info!(symbol, decision = ?bias_decision, reason = %bias_reason, "rejected by bias gate");
            return Ok(());
        }

        // External conditions.
        let info = self.broker.symbol_info(symbol).await?;
        let entry_tf = rec.entry_timeframe.unwrap_or(Timeframe::M15);
        let window = self.scanner.store().latest(symbol, entry_tf, 30).to_vec();
        if let Err(reason) = self
            .external
            .check(symbol, info.spread_pips, &window, Utc::now())
        {
            self.session.stats.rejections_external += 1;
            record.notes = format!("external filter: {}", reason);
            self.record_signal(&record);
            tracing::info!(symbol, %reason, "rejected by external filter");
            return Ok(());
        }

        // Session-level dedup.
        let id = signal_id(symbol, rec);
        if self.processed_signals.contains(&id) {
            self.session.stats.duplicate_signals += 1;
            record.notes = "duplicate signal".to_string();
            self.record_signal(&record);
            tracing::debug!(symbol, id, "duplicate signal skipped");
            return Ok(());
        }

        // Risk gates and sizing.
        let check = self.risk.can_trade(symbol);
        if !check.can_trade {
            self.session.stats.rejections_risk += 1;
            record.notes = format!("risk manager: {}", check.reason);
            self.record_signal(&record);
            tracing::info!(symbol, reason = %check.reason, "rejected by risk manager");
            return Ok(());
        }
        let entry = rec
            .entry_details
            .as_ref()
            .context("actionable recommendation without entry details")?;
        let (volume, position_risk) = self.risk.calculate_position_size_with(
            symbol,
            entry.entry_price,
            entry.stop_loss,
            info.pip_value_per_lot,
        );

        if !self.config.execution.enable_execution {
            record.notes = "signal-only mode".to_string();
            self.record_signal(&record);
            tracing::info!(symbol, action = %rec.action, "signal-only mode, order not sent");
            return Ok(());
        }

        match self.executor.execute(symbol, rec, volume).await {
            OrderOutcome::Submitted { request, result } => {
                self.risk.add_position(position_risk);
                self.processed_signals.insert(id);
                record.executed = true;
                record.notes = format!("order {} filled", result.order_id);
                self.record_signal(&record);
                self.session.log_trade(&TradeRecord {
                    timestamp: Utc::now(),
                    symbol: symbol.to_string(),
                    action: request.side.to_string(),
                    order_kind: format!("{:?}", request.kind).to_lowercase(),
                    volume: result.fill_volume,
                    price: result.fill_price,
                    stop_loss: request.stop_loss,
                    take_profit: request.take_profit,
                    order_id: result.order_id,
                    comment: request.comment,
                });
            }
            OrderOutcome::Rejected { reason } => {
                self.session.stats.rejections_quality += 1;
                record.notes = reason;
                self.record_signal(&record);
            }
            OrderOutcome::BrokerRejected(error) => {
                self.session.stats.rejections_broker += 1;
                record.notes = format!("broker: {}", error);
                self.record_signal(&record);
            }
        }
        Ok(())
    }

    /// Sleep in small chunks so a shutdown signal is observed promptly.
    async fn sleep_with_shutdown(&self, total: Duration) {
        let mut remaining = total;
        while remaining > Duration::ZERO && !self.shutdown.load(Ordering::SeqCst) {
            let chunk = remaining.min(SLEEP_CHUNK);
            tokio::time::sleep(chunk).await;
            remaining = remaining.saturating_sub(chunk);
        }
    }

    /// Signal-log rows respect `[quality] enable_logging`; session counters
    /// always update.
    fn record_signal(&mut self, record: &SignalRecord) {
        if self.config.quality.enable_logging {
            self.session.log_signal(record);
        } else {
            self.session.stats.signals_generated += 1;
            if record.executed {
                self.session.stats.signals_executed += 1;
            }
        }
    }

    pub fn session_stats(&self) -> &crate::session::SessionStats {
        &self.session.stats
    }

    /// Aggregate open risk fraction, for monitoring.
    pub fn open_risk_percentage(&self) -> f64 {
        self.risk.open_risk_percentage()
    }

    /// Establish the broker connection and seed balance and positions.
    pub async fn startup(&mut self) -> Result<()> {
        self.broker
            .connect()
            .await
            .context("unrecoverable broker init failure")?;
        let account = self
            .broker
            .account_info()
            .await
            .context("unrecoverable broker init failure")?;
        self.risk.update_balance(account.balance_f64());
        Ok(())
    }
}

fn signal_record(symbol: &str, rec: &Recommendation) -> SignalRecord {
    let entry = rec.entry_details.as_ref();
    SignalRecord {
        timestamp: Utc::now(),
        symbol: symbol.to_string(),
        timeframe: rec
            .entry_timeframe
            .map(|tf| tf.name().to_string())
            .unwrap_or_default(),
        action: rec.action.to_string(),
        confidence: format!("{:?}", rec.confidence).to_lowercase(),
        confidence_score: rec.confidence_score,
        confluence_score: rec.entry_confluence_score,
        entry_price: entry.map(|e| e.entry_price).unwrap_or(0.0),
        stop_loss: entry.map(|e| e.stop_loss).unwrap_or(0.0),
        take_profit: entry.map(|e| e.take_profit).unwrap_or(0.0),
        risk_reward_ratio: entry.map(|e| e.rr_ratio).unwrap_or(0.0),
        executed: false,
        notes: String::new(),
    }
}

/// One signal per (symbol, timeframe, action, entry): rescans within a
/// session never resubmit the same setup.
fn signal_id(symbol: &str, rec: &Recommendation) -> String {
    format!(
        "{}_{}_{}_{:.5}",
        symbol,
        rec.entry_timeframe.map(|tf| tf.name()).unwrap_or(""),
        rec.action,
        rec.entry_details.as_ref().map(|e| e.entry_price).unwrap_or(0.0)
    )
}

// ---------------------------------------------------------------------------
// Backtest mode
// ---------------------------------------------------------------------------

/// Replay mode: walk the historical series, generate a recommendation on
/// each bar from data available up to that bar, and feed the resulting
/// signals to the deterministic backtest engine.
pub async fn run_backtest(config: &EngineConfig, broker: Arc<dyn BrokerClient>) -> Result<()> {
    use backtest_engine::{BacktestConfig, BacktestEngine, BacktestSignal};

    broker.connect().await.context("broker init")?;

    let timeframes = config.trading.timeframe_list()?;
    let entry_tf = timeframes
        .iter()
        .copied()
        .min_by_key(|tf| tf.priority())
        .context("no timeframes configured")?;
    let settings = mtf_settings(config);
    let analyzer = multi_timeframe::MultiTimeframeAnalyzer::new(timeframes.clone(), settings);
    let quality = SignalQualityFilter::new(QualityFilterConfig {
        min_rr_ratio: config.quality.min_rr_ratio,
        ..QualityFilterConfig::default()
    });

    let start = NaiveDate::parse_from_str(&config.backtest.start_date, "%Y-%m-%d")?;
    let end = NaiveDate::parse_from_str(&config.backtest.end_date, "%Y-%m-%d")?;

    for symbol in config.trading.symbol_list() {
        let mut series: HashMap<Timeframe, Vec<Bar>> = HashMap::new();
        for &tf in &timeframes {
            let bars = broker
                .rates(&symbol, tf, config.execution.bars_per_scan * 2)
                .await
                .with_context(|| format!("history for {} {}", symbol, tf))?;
            series.insert(tf, bars);
        }
        let entry_bars = series.get(&entry_tf).cloned().unwrap_or_default();
        if entry_bars.is_empty() {
            tracing::warn!(symbol, "no entry-timeframe bars, skipped");
            continue;
        }

        // Restrict the replay to the configured window when it overlaps the
        // data; otherwise replay everything available.
        let in_window: Vec<Bar> = entry_bars
            .iter()
            .copied()
            .filter(|b| {
                let d = b.timestamp.date_naive();
                d >= start && d <= end
            })
            .collect();
        let replay = if in_window.len() >= 50 {
            in_window
        } else {
            tracing::warn!(
                symbol,
                "configured window thin, replaying the full series"
            );
            entry_bars.clone()
        };

        let warmup = config.execution.bars_per_scan.min(150);
        let mut signals: Vec<BacktestSignal> = Vec::new();

        for bar in replay.iter().skip(warmup) {
            let mut windows: HashMap<Timeframe, Vec<Bar>> = HashMap::new();
            for (&tf, bars) in &series {
                let upto: Vec<Bar> = bars
                    .iter()
                    .copied()
                    .filter(|b| b.timestamp <= bar.timestamp)
                    .collect();
                if !upto.is_empty() {
                    windows.insert(tf, upto);
                }
            }
            let Ok(analysis) = analyzer.analyze(&windows) else {
                continue;
            };
            if let Some(signal) = signal_from_analysis(&quality, &symbol, &analysis, bar) {
                signals.push(signal);
            }
        }

        let mut engine = BacktestEngine::new(BacktestConfig {
            initial_balance: config.backtest.initial_balance,
            commission: config.backtest.commission,
            risk_per_trade: config.trading.risk_per_trade,
            ..BacktestConfig::default()
        });
        let report = engine.run(&symbol, &replay, &signals);

        tracing::info!(
            symbol = %symbol,
            signals = report.total_signals,
            trades = report.executed_trades,
            pnl = format!("{:.2}", report.metrics.total_pnl),
            win_rate = format!("{:.1}%", report.metrics.win_rate),
            "backtest finished"
        );

        let out_dir = Path::new(&config.execution.session_dir);
        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join(format!("backtest_{}.json", symbol));
        report.save_json(&path)?;
        tracing::info!(path = %path.display(), "backtest report written");
    }

    broker.shutdown().await.ok();
    Ok(())
}

fn signal_from_analysis(
    quality: &SignalQualityFilter,
    symbol: &str,
    analysis: &MtfAnalysis,
    bar: &Bar,
) -> Option<backtest_engine::BacktestSignal> {
    let rec = &analysis.recommendation;
    if rec.action == SignalType::Wait {
        return None;
    }
    let entry = rec.entry_details.as_ref()?;
    let report = quality.evaluate(symbol, rec);

    Some(backtest_engine::BacktestSignal {
        timestamp: bar.timestamp,
        signal_type: rec.action,
        entry_price: entry.entry_price,
        stop_loss: entry.stop_loss,
        take_profit: entry.take_profit,
        quality_score: report.score,
        confluence_score: rec.entry_confluence_score,
        timeframe: rec.entry_timeframe,
    })
}

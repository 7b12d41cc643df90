use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{Bar, BarStore, Timeframe};
use anyhow::{bail, Context, Result};
use broker_trait::BrokerClient;
use multi_timeframe::{MtfAnalysis, MtfSettings, MultiTimeframeAnalyzer};

/// Bound on any single data request; a slow feed skips the iteration
/// instead of stalling the loop.
const RATES_TIMEOUT: Duration = Duration::from_secs(15);

/// Pulls bars from the broker into the bar store and runs the
/// multi-timeframe analysis for one symbol at a time.
pub struct MarketScanner {
    broker: Arc<dyn BrokerClient>,
    analyzer: MultiTimeframeAnalyzer,
    timeframes: Vec<Timeframe>,
    bars_per_scan: usize,
    store: BarStore,
}

impl MarketScanner {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        timeframes: Vec<Timeframe>,
        settings: MtfSettings,
        bars_per_scan: usize,
    ) -> Self {
        let analyzer = MultiTimeframeAnalyzer::new(timeframes.clone(), settings);
        Self {
            broker,
            analyzer,
            timeframes,
            bars_per_scan,
            store: BarStore::new(),
        }
    }

    pub fn store(&self) -> &BarStore {
        &self.store
    }

    /// Fetch the latest bars for every timeframe, appending only what is
    /// new. Missing or empty feeds abort the scan for this symbol; the
    /// caller skips the iteration and continues.
    async fn refresh(&mut self, symbol: &str) -> Result<()> {
        let timeframes = self.timeframes.clone();
        for tf in timeframes {
            let bars = tokio::time::timeout(
                RATES_TIMEOUT,
                self.broker.rates(symbol, tf, self.bars_per_scan),
            )
            .await
            .map_err(|_| broker_trait::BrokerError::Timeout)
            .with_context(|| format!("fetching {} {} bars", symbol, tf))?
            .with_context(|| format!("fetching {} {} bars", symbol, tf))?;
            if bars.is_empty() {
                bail!("broker returned no {} bars for {}", tf, symbol);
            }

            let last_known = self
                .store
                .latest(symbol, tf, 1)
                .last()
                .map(|b| b.timestamp);
            let fresh = bars
                .into_iter()
                .filter(|b| last_known.map_or(true, |t| b.timestamp > t));
            let appended = self.store.extend(symbol, tf, fresh)?;
            tracing::trace!(symbol, timeframe = %tf, appended, "bars refreshed");
        }
        Ok(())
    }

    /// Refresh data and produce the multi-timeframe analysis for `symbol`.
    pub async fn scan(&mut self, symbol: &str) -> Result<MtfAnalysis> {
        self.refresh(symbol).await?;

        let mut data: HashMap<Timeframe, Vec<Bar>> = HashMap::new();
        for &tf in &self.timeframes {
            let window = self.store.latest(symbol, tf, self.bars_per_scan);
            if !window.is_empty() {
                data.insert(tf, window.to_vec());
            }
        }

        self.analyzer
            .analyze(&data)
            .with_context(|| format!("analyzing {}", symbol))
    }
}

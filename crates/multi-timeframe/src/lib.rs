pub mod bias;
pub mod recommendation;

pub use bias::*;
pub use recommendation::*;

use std::collections::HashMap;

use analysis_core::{
    AnalysisError, Bar, MarketBias, SignalStrength, SignalType, Timeframe, TrendDirection,
};
use chrono::{DateTime, Utc};
use market_structure::{MarketStructure, MarketStructureAnalyzer};
use serde::{Deserialize, Serialize};
use signal_engine::{enhance_entry_with_atr, Candidate, SignalGenerator};
use smart_money::{SmartMoneyAnalyzer, SmcAnalysis};

/// Analysis settings shared by all timeframes, with per-timeframe swing
/// window overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtfSettings {
    pub swing_length: usize,
    pub timeframe_swing_lengths: HashMap<Timeframe, usize>,
    pub fvg_min_size: f64,
    pub order_block_lookback: usize,
    pub liquidity_threshold: f64,
    pub swing_point_lookback: usize,
    pub min_confluence_score: i32,
    pub min_rr_ratio: f64,
    pub atr_length: usize,
    pub atr_multiplier: f64,
}

impl Default for MtfSettings {
    fn default() -> Self {
        Self {
            swing_length: 15,
            timeframe_swing_lengths: HashMap::from([
                (Timeframe::M15, 10),
                (Timeframe::H1, 15),
                (Timeframe::H4, 20),
            ]),
            fvg_min_size: 5.0,
            order_block_lookback: 20,
            liquidity_threshold: 0.002,
            swing_point_lookback: 50,
            min_confluence_score: 7,
            min_rr_ratio: 2.0,
            atr_length: 14,
            atr_multiplier: 2.5,
        }
    }
}

impl MtfSettings {
    fn swing_length_for(&self, timeframe: Timeframe) -> usize {
        self.timeframe_swing_lengths
            .get(&timeframe)
            .copied()
            .unwrap_or(self.swing_length)
    }
}

/// Single-timeframe analysis bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub market_structure: MarketStructure,
    pub smc_analysis: SmcAnalysis,
    pub candidate: Candidate,
    pub current_price: f64,
    pub analysis_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAlignment {
    pub individual_trends: Vec<(Timeframe, TrendDirection)>,
    pub bullish_weight: f64,
    pub bearish_weight: f64,
    pub neutral_weight: f64,
    pub overall_trend: TrendDirection,
    pub alignment_strength: f64,
    pub is_aligned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfluence {
    pub individual_signals: Vec<(Timeframe, SignalType, SignalStrength, i32)>,
    pub buy_score: u32,
    pub sell_score: u32,
    pub wait_score: u32,
    pub overall_signal: SignalType,
    pub confluence_strength: f64,
    pub confluence_count: usize,
    pub active_timeframes: usize,
    pub has_confluence: bool,
}

impl SignalConfluence {
    pub fn total_signal_score(&self) -> u32 {
        self.buy_score + self.sell_score
    }
}

/// Full multi-timeframe analysis for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtfAnalysis {
    pub timeframe_analyses: Vec<TimeframeAnalysis>,
    pub trend_alignment: TrendAlignment,
    pub signal_confluence: SignalConfluence,
    pub market_bias: MarketBias,
    pub recommendation: Recommendation,
}

/// Coordinates analysis across timeframes for signal confirmation.
pub struct MultiTimeframeAnalyzer {
    timeframes: Vec<Timeframe>,
    settings: MtfSettings,
    smc_analyzer: SmartMoneyAnalyzer,
    signal_generator: SignalGenerator,
}

impl MultiTimeframeAnalyzer {
    pub fn new(mut timeframes: Vec<Timeframe>, settings: MtfSettings) -> Self {
        // Highest timeframe first.
        timeframes.sort_by_key(|tf| std::cmp::Reverse(tf.priority()));
        let smc_analyzer = SmartMoneyAnalyzer::new(
            settings.fvg_min_size,
            settings.order_block_lookback,
            settings.liquidity_threshold,
            settings.swing_point_lookback,
        );
        let signal_generator =
            SignalGenerator::new(settings.min_confluence_score, settings.min_rr_ratio);
        Self {
            timeframes,
            settings,
            smc_analyzer,
            signal_generator,
        }
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Analyze all configured timeframes and assemble a recommendation.
    pub fn analyze(
        &self,
        data: &HashMap<Timeframe, Vec<Bar>>,
    ) -> Result<MtfAnalysis, AnalysisError> {
        // First pass: trends only, to establish the top-down bias before
        // any per-timeframe signal is generated.
        let mut trends: HashMap<Timeframe, TrendDirection> = HashMap::new();
        for &tf in &self.timeframes {
            if let Some(bars) = data.get(&tf) {
                let analyzer = MarketStructureAnalyzer::new(self.settings.swing_length_for(tf));
                if let Ok(structure) = analyzer.analyze(bars) {
                    trends.insert(tf, structure.trend_direction);
                }
            }
        }
        let market_bias = BiasFilter::market_bias(
            trends.get(&Timeframe::H4).copied(),
            trends.get(&Timeframe::H1).copied(),
        );
        tracing::debug!(bias = %market_bias, "top-down market bias");

        let mut analyses = Vec::new();
        for &tf in &self.timeframes {
            let Some(bars) = data.get(&tf) else { continue };
            match self.analyze_timeframe(tf, bars, market_bias) {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => {
                    tracing::warn!(timeframe = %tf, error = %e, "timeframe analysis skipped");
                }
            }
        }
        if analyses.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "no timeframe produced an analysis".to_string(),
            ));
        }

        let trend_alignment = trend_alignment(&analyses);
        let signal_confluence = signal_confluence(&analyses);
        let entry_timeframe = entry_timeframe(&analyses, signal_confluence.overall_signal);
        let recommendation = assemble_recommendation(
            &analyses,
            &trend_alignment,
            &signal_confluence,
            entry_timeframe,
            market_bias,
        );

        Ok(MtfAnalysis {
            timeframe_analyses: analyses,
            trend_alignment,
            signal_confluence,
            market_bias,
            recommendation,
        })
    }

    fn analyze_timeframe(
        &self,
        timeframe: Timeframe,
        bars: &[Bar],
        market_bias: MarketBias,
    ) -> Result<TimeframeAnalysis, AnalysisError> {
        let structure_analyzer =
            MarketStructureAnalyzer::new(self.settings.swing_length_for(timeframe));
        let market_structure = structure_analyzer.analyze(bars)?;
        let smc_analysis = self.smc_analyzer.analyze(bars)?;
        let current_price = market_structure.current_price;

        let mut candidate = self.signal_generator.generate(
            &market_structure,
            &smc_analysis,
            current_price,
            Some(market_bias),
        );

        // ATR pass: widen structurally tight stops, preserving the R:R.
        if self.settings.atr_multiplier > 0.0 {
            if let Some(entry) = candidate.entry.take() {
                candidate.entry = Some(enhance_entry_with_atr(
                    &entry,
                    bars,
                    candidate.signal_type,
                    self.settings.atr_length,
                    self.settings.atr_multiplier,
                ));
            }
        }

        tracing::debug!(
            timeframe = %timeframe,
            signal = %candidate.signal_type,
            confluence = candidate.confluence_score,
            "timeframe analyzed"
        );

        Ok(TimeframeAnalysis {
            timeframe,
            current_price,
            analysis_timestamp: market_structure.analysis_timestamp,
            market_structure,
            smc_analysis,
            candidate,
        })
    }
}

/// Weighted trend vote across timeframes. A direction needs at least half
/// the normalized weight to become the overall trend.
pub fn trend_alignment(analyses: &[TimeframeAnalysis]) -> TrendAlignment {
    let mut bullish = 0.0;
    let mut bearish = 0.0;
    let mut neutral = 0.0;
    let mut total = 0.0;
    let mut individual = Vec::new();

    for a in analyses {
        let trend = a.market_structure.trend_direction;
        individual.push((a.timeframe, trend));
        let w = a.timeframe.weight();
        total += w;
        match trend {
            TrendDirection::Uptrend => bullish += w,
            TrendDirection::Downtrend => bearish += w,
            TrendDirection::Consolidation => neutral += w,
        }
    }

    if total > 0.0 {
        bullish /= total;
        bearish /= total;
        neutral /= total;
    }

    let overall_trend = if bullish >= 0.5 {
        TrendDirection::Uptrend
    } else if bearish >= 0.5 {
        TrendDirection::Downtrend
    } else {
        TrendDirection::Consolidation
    };
    let alignment_strength = bullish.max(bearish).max(neutral);

    TrendAlignment {
        individual_trends: individual,
        bullish_weight: bullish,
        bearish_weight: bearish,
        neutral_weight: neutral,
        overall_trend,
        alignment_strength,
        is_aligned: alignment_strength >= 0.6,
    }
}

/// Signal vote weighted by timeframe priority and signal strength. Wait
/// candidates never outvote actionable ones.
pub fn signal_confluence(analyses: &[TimeframeAnalysis]) -> SignalConfluence {
    let mut buy = 0u32;
    let mut sell = 0u32;
    let mut wait = 0u32;
    let mut individual = Vec::new();

    for a in analyses {
        let c = &a.candidate;
        individual.push((a.timeframe, c.signal_type, c.strength, c.confluence_score));
        let weight = a.timeframe.priority() * c.strength.multiplier();
        match c.signal_type {
            SignalType::Buy => buy += weight,
            SignalType::Sell => sell += weight,
            SignalType::Wait => wait += weight,
        }
    }

    let overall_signal = if buy == 0 && sell == 0 {
        SignalType::Wait
    } else if buy >= sell {
        SignalType::Buy
    } else {
        SignalType::Sell
    };

    let active_score = buy + sell;
    let max_active = buy.max(sell);
    let score_strength = if active_score > 0 {
        max_active as f64 / active_score as f64
    } else {
        0.0
    };

    let mut confluence_count = 0usize;
    let mut active_timeframes = 0usize;
    for (_, signal, _, _) in &individual {
        if *signal != SignalType::Wait {
            active_timeframes += 1;
            if *signal == overall_signal {
                confluence_count += 1;
            }
        }
    }
    let agreement = if active_timeframes > 0 {
        confluence_count as f64 / active_timeframes as f64
    } else {
        0.0
    };
    let confluence_strength = score_strength.max(agreement);

    SignalConfluence {
        individual_signals: individual,
        buy_score: buy,
        sell_score: sell,
        wait_score: wait,
        overall_signal,
        confluence_strength,
        confluence_count,
        active_timeframes,
        has_confluence: confluence_strength >= 0.6 || confluence_count >= 2,
    }
}

/// Entry timeframe: among timeframes agreeing with the overall signal and
/// carrying at least 3 confluence points, prefer the finest one; ties break
/// by higher confluence, then better R:R.
pub fn entry_timeframe(
    analyses: &[TimeframeAnalysis],
    overall_signal: SignalType,
) -> Option<Timeframe> {
    if overall_signal == SignalType::Wait {
        return None;
    }

    let mut matching: Vec<&TimeframeAnalysis> = analyses
        .iter()
        .filter(|a| a.candidate.signal_type == overall_signal && a.candidate.is_actionable())
        .collect();
    if matching.is_empty() {
        return None;
    }

    matching.sort_by(|a, b| {
        a.timeframe
            .priority()
            .cmp(&b.timeframe.priority())
            .then(b.candidate.confluence_score.cmp(&a.candidate.confluence_score))
            .then(
                b.candidate
                    .rr_ratio()
                    .partial_cmp(&a.candidate.rr_ratio())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    matching
        .iter()
        .find(|a| a.candidate.confluence_score >= 3)
        .or(matching.first())
        .map(|a| a.timeframe)
}

use analysis_core::{MarketBias, SignalStrength, SignalType, Timeframe, TrendDirection};
use serde::{Deserialize, Serialize};
use signal_engine::{EntryDetails, SetupType};

use crate::{SignalConfluence, TimeframeAnalysis, TrendAlignment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

impl ConfidenceLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceLabel::High
        } else if score >= 0.6 {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}

/// The aggregator's final, strictly-typed output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: SignalType,
    pub confidence: ConfidenceLabel,
    pub confidence_score: f64,
    pub entry_timeframe: Option<Timeframe>,
    pub market_bias: MarketBias,
    pub trend_direction: TrendDirection,
    pub trend_aligned: bool,
    pub has_confluence: bool,
    pub confluence_count: usize,
    pub total_signal_score: u32,
    pub entry_details: Option<EntryDetails>,
    pub entry_confluence_score: i32,
    pub strength: SignalStrength,
    pub setup_type: SetupType,
    pub strength_factors: Vec<String>,
}

/// Assemble the final recommendation, enforcing the trend-signal rules:
/// counter-trend breakouts are blocked, counter-trend pullbacks need 3
/// aligned timeframes (4 for weak setups), and consolidation needs 2
/// aligned timeframes or a confidence score of at least 0.7.
pub fn assemble_recommendation(
    analyses: &[TimeframeAnalysis],
    trend_alignment: &TrendAlignment,
    signal_confluence: &SignalConfluence,
    entry_timeframe: Option<Timeframe>,
    market_bias: MarketBias,
) -> Recommendation {
    let mut action = signal_confluence.overall_signal;
    let mut entry_tf = entry_timeframe;
    let overall_trend = trend_alignment.overall_trend;

    let entry_analysis =
        entry_tf.and_then(|tf| analyses.iter().find(|a| a.timeframe == tf));
    let setup_type = entry_analysis
        .map(|a| a.candidate.setup_type)
        .unwrap_or(SetupType::Pullback);

    let confidence_score_val =
        confidence_score(trend_alignment, signal_confluence, entry_tf.is_some());

    if action != SignalType::Wait {
        let counter_trend = matches!(
            (overall_trend, action),
            (TrendDirection::Downtrend, SignalType::Buy)
                | (TrendDirection::Uptrend, SignalType::Sell)
        );
        let count = signal_confluence.confluence_count;

        if counter_trend {
            match setup_type {
                SetupType::Breakout => {
                    tracing::warn!(
                        %action, trend = %overall_trend,
                        "counter-trend breakout blocked"
                    );
                    action = SignalType::Wait;
                    entry_tf = None;
                }
                SetupType::Pullback => {
                    // A pullback backed by a point of interest needs 3
                    // aligned timeframes; a bare one needs 4.
                    let has_poi = entry_analysis
                        .map(|a| {
                            a.candidate
                                .confluence_factors
                                .iter()
                                .any(|f| f.factor.ends_with("POI"))
                        })
                        .unwrap_or(false);
                    let required = if has_poi { 3 } else { 4 };
                    if count < required {
                        tracing::warn!(
                            %action, trend = %overall_trend, count,
                            "counter-trend pullback lacks confluence"
                        );
                        action = SignalType::Wait;
                        entry_tf = None;
                    }
                }
            }
        } else if overall_trend == TrendDirection::Consolidation
            && count < 2
            && confidence_score_val < 0.7
        {
            tracing::info!(%action, count, confidence_score = confidence_score_val, "consolidation signal degraded");
            action = SignalType::Wait;
            entry_tf = None;
        }
    }

    // Overrides may have cleared the entry timeframe; the reported
    // confidence reflects the final state.
    let confidence_score_val =
        confidence_score(trend_alignment, signal_confluence, entry_tf.is_some());

    let entry_analysis = entry_tf.and_then(|tf| analyses.iter().find(|a| a.timeframe == tf));
    let entry_details = entry_analysis.and_then(|a| a.candidate.entry.clone());
    let entry_confluence_score = entry_analysis
        .map(|a| a.candidate.confluence_score)
        .unwrap_or(0);
    let strength = entry_analysis
        .map(|a| a.candidate.strength)
        .unwrap_or(SignalStrength::Weak);

    let strength_factors =
        strength_factors(trend_alignment, signal_confluence, entry_analysis);

    Recommendation {
        action,
        confidence: ConfidenceLabel::from_score(confidence_score_val),
        confidence_score: confidence_score_val,
        entry_timeframe: entry_tf,
        market_bias,
        trend_direction: overall_trend,
        trend_aligned: trend_alignment.is_aligned,
        has_confluence: signal_confluence.has_confluence,
        confluence_count: signal_confluence.confluence_count,
        total_signal_score: signal_confluence.total_signal_score(),
        entry_details,
        entry_confluence_score,
        strength,
        setup_type,
        strength_factors,
    }
}

/// 0.3 for alignment, 0.3 for confluence, 0.2 for a usable entry timeframe,
/// 0.05 per aligned timeframe, clamped to 1.
pub fn confidence_score(
    trend_alignment: &TrendAlignment,
    signal_confluence: &SignalConfluence,
    has_entry_timeframe: bool,
) -> f64 {
    let mut score = 0.0;
    if trend_alignment.is_aligned {
        score += 0.3;
    }
    if signal_confluence.has_confluence {
        score += 0.3;
    }
    if has_entry_timeframe {
        score += 0.2;
    }
    score += signal_confluence.confluence_count as f64 * 0.05;
    score.min(1.0)
}

fn strength_factors(
    trend_alignment: &TrendAlignment,
    signal_confluence: &SignalConfluence,
    entry_analysis: Option<&TimeframeAnalysis>,
) -> Vec<String> {
    let mut factors = Vec::new();

    if trend_alignment.is_aligned {
        factors.push(format!(
            "Strong {} alignment ({:.0}% confidence)",
            trend_alignment.overall_trend,
            trend_alignment.alignment_strength * 100.0
        ));
    }
    if signal_confluence.has_confluence {
        factors.push(format!(
            "Multi-TF confluence ({} timeframes aligned)",
            signal_confluence.confluence_count
        ));
    }

    if let Some(entry) = entry_analysis {
        let tf = entry.timeframe;
        if let Some(details) = &entry.candidate.entry {
            if details.rr_ratio >= 2.0 {
                factors.push(format!(
                    "Excellent RR ratio ({:.1}:1) on {}",
                    details.rr_ratio, tf
                ));
            } else if details.rr_ratio >= 1.5 {
                factors.push(format!("Good RR ratio ({:.1}:1) on {}", details.rr_ratio, tf));
            }
        }
        if entry.candidate.confluence_score >= 10 {
            factors.push(format!(
                "High confluence setup ({}/15) on {}",
                entry.candidate.confluence_score, tf
            ));
        }

        let smc = &entry.smc_analysis;
        if smc.valid_order_blocks.len() >= 5 {
            factors.push(format!(
                "Strong OB presence ({} valid blocks)",
                smc.valid_order_blocks.len()
            ));
        }
        if smc.active_fvgs.len() >= 3 {
            factors.push(format!("FVG confluence ({} active gaps)", smc.active_fvgs.len()));
        }
        if smc.liquidity_zones.len() <= 6 {
            factors.push("Clean liquidity environment (low noise)".to_string());
        }
        if entry.market_structure.structure_breaks.len() >= 3 {
            factors.push(format!(
                "Recent structure activity ({} breaks)",
                entry.market_structure.structure_breaks.len()
            ));
        }
        if smc.liquidity_sweeps.is_empty() {
            factors.push("No recent sweeps detected (caution)".to_string());
        }
        if smc.breaker_blocks.is_empty() {
            factors.push("No breaker blocks active".to_string());
        }
    }

    factors
}

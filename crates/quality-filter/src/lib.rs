use analysis_core::{MarketBias, SignalType};
use multi_timeframe::{ConfidenceLabel, Recommendation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Poor,
    Moderate,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub grade: QualityGrade,
    /// Normalised quality score, 0..=1.
    pub score: f64,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDecision {
    pub execute: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityFilterConfig {
    pub min_confluence_score: f64,
    pub min_strength_factors: usize,
    pub min_rr_ratio: f64,
    pub min_trend_confidence: f64,
}

impl Default for QualityFilterConfig {
    fn default() -> Self {
        Self {
            min_confluence_score: 3.0,
            min_strength_factors: 3,
            min_rr_ratio: 2.5,
            min_trend_confidence: 0.7,
        }
    }
}

/// Grades a recommendation before it reaches the risk manager.
///
/// Points accumulate over a 12-point scale; direction and bias problems
/// multiply the accumulated score down instead of rejecting outright, so a
/// downstream consumer can still see a graded result.
pub struct SignalQualityFilter {
    config: QualityFilterConfig,
}

impl SignalQualityFilter {
    pub fn new(config: QualityFilterConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, symbol: &str, rec: &Recommendation) -> QualityReport {
        let mut points = 0.0f64;
        let mut issues = Vec::new();

        // Market bias alignment is the critical gate.
        match (rec.market_bias, rec.action) {
            (MarketBias::Bullish, SignalType::Buy) | (MarketBias::Bearish, SignalType::Sell) => {
                points += 2.0;
            }
            (_, SignalType::Wait) => {}
            (MarketBias::Neutral | MarketBias::Conflict, _) => {
                issues.push(format!(
                    "signal generated in a {} market bias",
                    rec.market_bias
                ));
            }
            _ => {
                issues.push(format!(
                    "signal direction ({}) conflicts with market bias ({})",
                    rec.action, rec.market_bias
                ));
                points *= 0.3;
            }
        }

        // Direction validity (SL/TP ordering).
        let direction_valid = validate_direction(rec);
        if direction_valid {
            points += 2.0;
        } else {
            issues.push("invalid SL/TP direction - low confidence".to_string());
            points *= 0.1;
        }

        // Risk:reward.
        let rr = rec.entry_details.as_ref().map(|e| e.rr_ratio).unwrap_or(0.0);
        if rr >= self.config.min_rr_ratio {
            points += 1.0;
        } else if rr >= 2.0 {
            points += 0.5;
        } else {
            issues.push(format!("poor R:R ratio ({:.2}:1)", rr));
        }

        // Entry-timeframe confluence.
        let confluence = rec.entry_confluence_score as f64;
        if confluence >= self.config.min_confluence_score {
            points += 1.5;
        } else if confluence >= 2.0 {
            points += 1.0;
        } else {
            issues.push(format!("low confluence score ({})", rec.entry_confluence_score));
        }

        // Strength factors.
        let factors = rec.strength_factors.len();
        if factors >= self.config.min_strength_factors {
            points += 1.0;
        } else if factors >= 2 {
            points += 0.5;
        } else {
            issues.push(format!("insufficient strength factors ({})", factors));
        }

        // Trend alignment and cross-timeframe confluence.
        if rec.trend_aligned && rec.has_confluence {
            points += 1.5;
        } else if rec.trend_aligned || rec.has_confluence {
            points += 1.0;
        } else {
            issues.push("no trend alignment or signal confluence".to_string());
        }

        // Timeframe agreement.
        if rec.confluence_count >= 3 {
            points += 1.0;
        } else if rec.confluence_count >= 2 {
            points += 0.5;
        } else {
            issues.push(format!(
                "insufficient timeframe agreement ({}/3 TFs)",
                rec.confluence_count
            ));
        }

        // Structure confidence.
        if rec.confidence_score >= self.config.min_trend_confidence {
            points += 1.0;
        } else if rec.confidence_score >= 0.5 {
            points += 0.5;
        } else {
            issues.push(format!(
                "poor market structure quality (confidence {:.0}%)",
                rec.confidence_score * 100.0
            ));
        }

        // Density of SMC components among the strength factors.
        let smc_mentions = rec
            .strength_factors
            .iter()
            .filter(|f| {
                let f = f.to_lowercase();
                ["ob", "order block", "fvg", "fair value", "liquidity", "structure"]
                    .iter()
                    .any(|kw| f.contains(kw))
            })
            .count();
        if smc_mentions >= 3 {
            points += 1.0;
        } else if smc_mentions >= 2 {
            points += 0.5;
        } else {
            issues.push(format!("low SMC component density ({} mentions)", smc_mentions));
        }

        // Confidence label.
        if rec.confidence == ConfidenceLabel::High && rec.confidence_score >= 0.8 {
            points += 0.5;
        } else if rec.confidence >= ConfidenceLabel::Medium {
            points += 0.25;
        } else {
            issues.push(format!("low confidence ({:?})", rec.confidence));
        }

        let score = (points / 12.0).clamp(0.0, 1.0);
        let grade = if score >= 0.85 {
            QualityGrade::Excellent
        } else if score >= 0.70 {
            QualityGrade::Good
        } else if score >= 0.50 {
            QualityGrade::Moderate
        } else {
            QualityGrade::Poor
        };

        tracing::debug!(
            symbol,
            ?grade,
            score = format!("{:.2}", score),
            issues = issues.len(),
            "quality evaluation"
        );

        QualityReport { grade, score, issues }
    }

    /// Excellent and Good execute; Moderate only with outstanding R:R and
    /// high confidence; everything else waits with a specific reason.
    pub fn should_execute(&self, symbol: &str, rec: &Recommendation) -> ExecutionDecision {
        let report = self.evaluate(symbol, rec);
        let has_bias_conflict = report
            .issues
            .iter()
            .any(|i| i.contains("conflicts with market bias"));
        let has_sltp_issue = report.issues.iter().any(|i| i.contains("SL/TP"));

        match report.grade {
            QualityGrade::Excellent | QualityGrade::Good => ExecutionDecision {
                execute: true,
                reason: format!(
                    "{}: {:?} quality ({:.0}%) - EXECUTE",
                    symbol,
                    report.grade,
                    report.score * 100.0
                ),
            },
            QualityGrade::Moderate => {
                let rr = rec.entry_details.as_ref().map(|e| e.rr_ratio).unwrap_or(0.0);
                if rr >= 3.0 && rec.confidence == ConfidenceLabel::High {
                    ExecutionDecision {
                        execute: true,
                        reason: format!(
                            "{}: MODERATE quality but high R:R and confidence - EXECUTE",
                            symbol
                        ),
                    }
                } else if has_bias_conflict {
                    ExecutionDecision {
                        execute: false,
                        reason: format!("{}: WAIT - bias mismatch during consolidation", symbol),
                    }
                } else {
                    ExecutionDecision {
                        execute: false,
                        reason: format!(
                            "{}: WAIT - moderate quality with additional concerns",
                            symbol
                        ),
                    }
                }
            }
            QualityGrade::Poor => {
                if has_bias_conflict && !has_sltp_issue {
                    ExecutionDecision {
                        execute: false,
                        reason: format!("{}: WAIT - signal conflicts with market bias", symbol),
                    }
                } else if has_sltp_issue && !has_bias_conflict {
                    ExecutionDecision {
                        execute: false,
                        reason: format!(
                            "{}: LOW_CONFIDENCE_{} - SL/TP validation failed",
                            symbol, rec.action
                        ),
                    }
                } else {
                    ExecutionDecision {
                        execute: false,
                        reason: format!(
                            "{}: REJECT - multiple quality issues: {}",
                            symbol,
                            report.issues.iter().take(2).cloned().collect::<Vec<_>>().join("; ")
                        ),
                    }
                }
            }
        }
    }
}

fn validate_direction(rec: &Recommendation) -> bool {
    let Some(entry) = &rec.entry_details else {
        // Wait recommendations carry no levels to validate.
        return rec.action == SignalType::Wait;
    };
    match rec.action {
        SignalType::Buy => entry.stop_loss < entry.entry_price && entry.entry_price < entry.take_profit,
        SignalType::Sell => entry.take_profit < entry.entry_price && entry.entry_price < entry.stop_loss,
        SignalType::Wait => true,
    }
}

#[cfg(test)]
mod tests;

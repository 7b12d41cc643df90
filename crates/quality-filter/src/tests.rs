use analysis_core::{MarketBias, SignalStrength, SignalType, Timeframe, TrendDirection};
use multi_timeframe::{ConfidenceLabel, Recommendation};
use signal_engine::{EntryDetails, SetupType};

use crate::{QualityFilterConfig, QualityGrade, SignalQualityFilter};

fn filter() -> SignalQualityFilter {
    SignalQualityFilter::new(QualityFilterConfig::default())
}

fn buy_entry(rr: f64) -> EntryDetails {
    EntryDetails {
        entry_price: 1.1000,
        stop_loss: 1.0980,
        take_profit: 1.1000 + 0.0020 * rr,
        rr_ratio: rr,
        risk_pips: 20.0,
        reward_pips: 20.0 * rr,
    }
}

fn premium_buy() -> Recommendation {
    Recommendation {
        action: SignalType::Buy,
        confidence: ConfidenceLabel::High,
        confidence_score: 0.95,
        entry_timeframe: Some(Timeframe::M15),
        market_bias: MarketBias::Bullish,
        trend_direction: TrendDirection::Uptrend,
        trend_aligned: true,
        has_confluence: true,
        confluence_count: 3,
        total_signal_score: 40,
        entry_details: Some(buy_entry(3.0)),
        entry_confluence_score: 10,
        strength: SignalStrength::Strong,
        setup_type: SetupType::Pullback,
        strength_factors: vec![
            "Strong uptrend alignment (95% confidence)".to_string(),
            "Multi-TF confluence (3 timeframes aligned)".to_string(),
            "Bullish order block defended".to_string(),
            "FVG confluence (3 active gaps)".to_string(),
            "Recent structure activity (3 breaks)".to_string(),
        ],
    }
}

#[test]
fn premium_recommendation_grades_excellent_and_executes() {
    let f = filter();
    let rec = premium_buy();
    let report = f.evaluate("EURUSD", &rec);
    assert_eq!(report.grade, QualityGrade::Excellent);
    assert!(report.score >= 0.85);

    let decision = f.should_execute("EURUSD", &rec);
    assert!(decision.execute);
    assert!(decision.reason.contains("EXECUTE"));
}

#[test]
fn bias_conflict_on_a_weak_signal_is_rejected_with_reason() {
    let rec = Recommendation {
        market_bias: MarketBias::Bearish,
        confidence: ConfidenceLabel::Low,
        confidence_score: 0.4,
        trend_aligned: false,
        has_confluence: false,
        confluence_count: 1,
        entry_details: Some(buy_entry(2.0)),
        entry_confluence_score: 2,
        strength_factors: vec!["Good RR ratio (2.0:1) on M15".to_string()],
        ..premium_buy()
    };
    let f = filter();
    let report = f.evaluate("EURUSD", &rec);
    assert_eq!(report.grade, QualityGrade::Poor);

    let decision = f.should_execute("EURUSD", &rec);
    assert!(!decision.execute);
    assert!(decision.reason.contains("conflicts with market bias"));
}

#[test]
fn invalid_sl_tp_is_kept_as_low_confidence_not_crash() {
    // BUY with the target below entry: direction invariant broken.
    let broken_entry = EntryDetails {
        entry_price: 1.1000,
        stop_loss: 1.0980,
        take_profit: 1.0990,
        rr_ratio: 2.6,
        risk_pips: 20.0,
        reward_pips: 10.0,
    };
    let rec = Recommendation {
        confidence: ConfidenceLabel::Medium,
        confidence_score: 0.55,
        trend_aligned: true,
        has_confluence: false,
        confluence_count: 2,
        entry_details: Some(broken_entry),
        entry_confluence_score: 2,
        strength_factors: vec![
            "Bullish order block defended".to_string(),
            "Recent structure activity (3 breaks)".to_string(),
        ],
        ..premium_buy()
    };
    let f = filter();
    let report = f.evaluate("EURUSD", &rec);
    assert_eq!(report.grade, QualityGrade::Poor);
    assert!(report.issues.iter().any(|i| i.contains("SL/TP")));

    let decision = f.should_execute("EURUSD", &rec);
    assert!(!decision.execute);
    assert!(decision.reason.contains("SL/TP validation failed"));
}

fn moderate_buy(rr: f64) -> Recommendation {
    Recommendation {
        market_bias: MarketBias::Neutral,
        confidence: ConfidenceLabel::High,
        confidence_score: 0.82,
        trend_aligned: true,
        has_confluence: false,
        confluence_count: 2,
        entry_details: Some(buy_entry(rr)),
        entry_confluence_score: 4,
        strength_factors: vec![
            format!("Excellent RR ratio ({:.1}:1) on M15", rr),
            "Multi-TF agreement (2 timeframes)".to_string(),
        ],
        ..premium_buy()
    }
}

#[test]
fn moderate_needs_outstanding_rr_and_high_confidence() {
    let f = filter();

    let rec = moderate_buy(3.2);
    let report = f.evaluate("GBPUSD", &rec);
    assert_eq!(report.grade, QualityGrade::Moderate);
    assert!(f.should_execute("GBPUSD", &rec).execute);

    let rec = moderate_buy(2.6);
    let report = f.evaluate("GBPUSD", &rec);
    assert_eq!(report.grade, QualityGrade::Moderate);
    let decision = f.should_execute("GBPUSD", &rec);
    assert!(!decision.execute);
    assert!(decision.reason.contains("WAIT"));
}

#[test]
fn wait_recommendation_without_entry_is_not_a_direction_violation() {
    let rec = Recommendation {
        action: SignalType::Wait,
        entry_details: None,
        entry_timeframe: None,
        ..premium_buy()
    };
    let report = filter().evaluate("EURUSD", &rec);
    assert!(!report.issues.iter().any(|i| i.contains("SL/TP")));
}

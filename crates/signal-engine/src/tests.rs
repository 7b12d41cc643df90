use analysis_core::{MarketBias, SignalDirection, SignalType, TrendDirection};
use chrono::{TimeZone, Utc};
use market_structure::{BreakKind, BreakQuality, MarketStructure, StructureBreak};
use smart_money::{
    FairValueGap, FvgKind, LiquidityZone, LiquiditySide, OrderBlock, OrderBlockKind,
    PremiumDiscountZones, SmcAnalysis, Sweep, SweepKind, SweepPattern, ZoneQuality,
};

use crate::{score_confluence, SetupType, SignalGenerator};

fn ts(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 13, hour, 0, 0).unwrap()
}

fn uptrend_structure(breaks: Vec<StructureBreak>) -> MarketStructure {
    MarketStructure {
        swing_highs: Vec::new(),
        swing_lows: Vec::new(),
        trend_direction: TrendDirection::Uptrend,
        trend_strength: 0.8,
        structure_breaks: breaks,
        current_price: 1.10025,
        analysis_timestamp: ts(12),
    }
}

fn bullish_bos() -> StructureBreak {
    StructureBreak {
        timestamp: ts(10),
        kind: BreakKind::Bos,
        direction: SignalDirection::Bullish,
        broken_level: 1.0990,
        break_price: 1.1005,
        close_price: 1.1002,
        strength: 0.4,
        quality: BreakQuality::High,
        momentum_confirmed: true,
        volume_confirmed: true,
    }
}

fn bullish_ob() -> OrderBlock {
    OrderBlock {
        timestamp: ts(8),
        index: 40,
        kind: OrderBlockKind::Bullish,
        top: 1.10050,
        bottom: 1.10000,
        strength: 0.6,
        body_ratio: 0.8,
        volume_strength: 1.5,
        tested: false,
        valid: true,
        quality: ZoneQuality::High,
    }
}

fn low_sweep() -> Sweep {
    Sweep {
        timestamp: ts(9),
        pattern: SweepPattern::StopLossRaid,
        kind: SweepKind::EqualLows,
        level: 1.0995,
        sweep_strength: 0.001,
        reversal_strength: 0.001,
        manipulation_score: 0.002,
    }
}

fn empty_smc(current_price: f64) -> SmcAnalysis {
    SmcAnalysis {
        fair_value_gaps: Vec::new(),
        active_fvgs: Vec::new(),
        order_blocks: Vec::new(),
        valid_order_blocks: Vec::new(),
        liquidity_zones: Vec::new(),
        liquidity_sweeps: Vec::new(),
        supply_demand_zones: Vec::new(),
        valid_supply_demand: Vec::new(),
        breaker_blocks: Vec::new(),
        premium_discount: None,
        current_price,
        analysis_timestamp: ts(12),
    }
}

/// A rich bullish context: aligned OB, opposite-side sweep, discount
/// pricing, and a liquidity target overhead.
fn rich_bullish_smc(current_price: f64) -> SmcAnalysis {
    let mut smc = empty_smc(current_price);
    smc.valid_order_blocks = vec![bullish_ob()];
    smc.order_blocks = smc.valid_order_blocks.clone();
    smc.liquidity_sweeps = vec![low_sweep()];
    smc.premium_discount = Some(PremiumDiscountZones {
        major_high: 1.1100,
        major_low: 1.0950,
        equilibrium: 1.1025,
        range_start: ts(0),
        range_end: ts(12),
    });
    smc.liquidity_zones = vec![LiquidityZone {
        timestamp: ts(6),
        index: 30,
        side: LiquiditySide::High,
        level: 1.10600,
        touches: 4,
        strength: 0.4,
        distance_from_price: 0.005,
        swept: false,
    }];
    smc
}

#[test]
fn rich_bullish_context_emits_a_buy() {
    let generator = SignalGenerator::new(7, 2.0);
    let structure = uptrend_structure(vec![bullish_bos()]);
    let smc = rich_bullish_smc(1.10025);

    let candidate = generator.generate(&structure, &smc, 1.10025, Some(MarketBias::Bullish));
    assert_eq!(candidate.signal_type, SignalType::Buy);
    assert_eq!(candidate.direction, SignalDirection::Bullish);
    assert_eq!(candidate.setup_type, SetupType::Breakout);
    assert!(candidate.confluence_score >= 7);

    let entry = candidate.entry.expect("buy candidate carries entry details");
    assert!(entry.stop_loss < entry.entry_price);
    assert!(entry.entry_price < entry.take_profit);
    assert!(entry.rr_ratio >= 2.0);
}

#[test]
fn consolidation_is_a_wait() {
    let generator = SignalGenerator::new(7, 2.0);
    let mut structure = uptrend_structure(Vec::new());
    structure.trend_direction = TrendDirection::Consolidation;
    let smc = rich_bullish_smc(1.10025);

    let candidate = generator.generate(&structure, &smc, 1.10025, None);
    assert_eq!(candidate.signal_type, SignalType::Wait);
    assert!(candidate.wait_reason.is_some());
}

#[test]
fn thin_confluence_is_a_wait() {
    let generator = SignalGenerator::new(7, 2.0);
    // Uptrend but no structures at all: 1 + 2 + 2 (no opposing zone) + 0.
    let structure = uptrend_structure(Vec::new());
    let smc = empty_smc(1.10025);

    let candidate = generator.generate(&structure, &smc, 1.10025, None);
    assert_eq!(candidate.signal_type, SignalType::Wait);
    assert!(candidate.confluence_score < 7);
}

#[test]
fn confluence_scores_the_documented_factors() {
    let structure = uptrend_structure(vec![bullish_bos()]);
    let smc = rich_bullish_smc(1.10025);

    let confluence = score_confluence(&structure, &smc, 1.10025, Some(MarketBias::Bullish));
    // 1 direction + 2 alignment + 3 BOS + 3 sweep + 3 OB POI + 2 discount
    // + 2 no-opposing-zone + 1 candle pattern = 17.
    assert_eq!(confluence.total_score, 17);
    let names: Vec<&str> = confluence.factors.iter().map(|f| f.factor.as_str()).collect();
    assert!(names.contains(&"BOS Confirmation"));
    assert!(names.contains(&"Opposite Liquidity Sweep"));
    assert!(names.contains(&"Valid OB as POI"));
    assert!(names.contains(&"Premium/Discount Alignment"));
}

#[test]
fn choch_scores_only_without_aligned_bos() {
    let choch = StructureBreak {
        kind: BreakKind::Choch,
        ..bullish_bos()
    };

    // CHOCH alone: the fallback fires.
    let structure = uptrend_structure(vec![choch.clone()]);
    let confluence = score_confluence(&structure, &empty_smc(1.1), 1.1, None);
    assert!(confluence.factors.iter().any(|f| f.factor == "CHOCH Reversal"));

    // CHOCH next to an aligned BOS: only the BOS scores.
    let structure = uptrend_structure(vec![bullish_bos(), choch]);
    let confluence = score_confluence(&structure, &empty_smc(1.1), 1.1, None);
    assert!(confluence.factors.iter().any(|f| f.factor == "BOS Confirmation"));
    assert!(!confluence.factors.iter().any(|f| f.factor == "CHOCH Reversal"));
}

#[test]
fn opposite_sweep_adds_three_for_a_bearish_candidate() {
    let mut structure = uptrend_structure(Vec::new());
    structure.trend_direction = TrendDirection::Downtrend;
    let mut smc = empty_smc(1.3000);
    smc.liquidity_sweeps = vec![Sweep {
        timestamp: ts(9),
        pattern: SweepPattern::StopLossRaid,
        kind: SweepKind::EqualHighs,
        level: 1.3000,
        sweep_strength: 0.0002,
        reversal_strength: 0.0005,
        manipulation_score: 0.0007,
    }];

    let confluence = score_confluence(&structure, &smc, 1.2995, None);
    let sweep_factor = confluence
        .factors
        .iter()
        .find(|f| f.factor == "Opposite Liquidity Sweep")
        .expect("sweep of the high side supports a bearish candidate");
    assert_eq!(sweep_factor.score, 3);
}

#[test]
fn same_side_sweep_does_not_score() {
    let structure = uptrend_structure(Vec::new());
    let mut smc = empty_smc(1.3000);
    // A high-side sweep does not support a bullish candidate.
    smc.liquidity_sweeps = vec![Sweep {
        timestamp: ts(9),
        pattern: SweepPattern::LiquidityGrab,
        kind: SweepKind::High,
        level: 1.3000,
        sweep_strength: 0.0002,
        reversal_strength: 0.0005,
        manipulation_score: 0.0007,
    }];

    let confluence = score_confluence(&structure, &smc, 1.2995, None);
    assert!(!confluence
        .factors
        .iter()
        .any(|f| f.factor == "Opposite Liquidity Sweep"));
}

#[test]
fn mitigated_fvg_is_not_a_poi() {
    let structure = uptrend_structure(Vec::new());
    let mut smc = empty_smc(1.1010);
    smc.active_fvgs = vec![FairValueGap {
        timestamp: ts(5),
        index: 20,
        kind: FvgKind::Bullish,
        top: 1.1015,
        bottom: 1.1005,
        size_pips: 10.0,
        mitigation_percent: 80.0,
    }];

    let confluence = score_confluence(&structure, &smc, 1.1010, None);
    assert!(!confluence.factors.iter().any(|f| f.factor == "Valid FVG as POI"));

    smc.active_fvgs[0].mitigation_percent = 20.0;
    let confluence = score_confluence(&structure, &smc, 1.1010, None);
    assert!(confluence.factors.iter().any(|f| f.factor == "Valid FVG as POI"));
}

#[test]
fn pullback_enters_at_order_block_equilibrium() {
    let generator = SignalGenerator::new(7, 2.0);
    // No structure break factor: the setup reads as a pullback.
    let structure = uptrend_structure(Vec::new());
    let smc = rich_bullish_smc(1.10025);

    let candidate = generator.generate(&structure, &smc, 1.10025, Some(MarketBias::Bullish));
    assert_eq!(candidate.signal_type, SignalType::Buy);
    assert_eq!(candidate.setup_type, SetupType::Pullback);
    let entry = candidate.entry.unwrap();
    assert!((entry.entry_price - 1.10025).abs() < 1e-9); // (top + bottom) / 2
}

#[test]
fn emitted_candidates_always_respect_min_rr() {
    let generator = SignalGenerator::new(7, 2.0);
    let structure = uptrend_structure(vec![bullish_bos()]);
    for price in [1.0980, 1.1000, 1.10025, 1.1010, 1.1040] {
        let smc = rich_bullish_smc(price);
        let candidate = generator.generate(&structure, &smc, price, Some(MarketBias::Bullish));
        if candidate.signal_type != SignalType::Wait {
            assert!(candidate.rr_ratio() >= 2.0, "price {}: rr too low", price);
        }
    }
}

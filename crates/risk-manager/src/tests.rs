use crate::{PositionRisk, RiskManager, RiskProfile};

fn risk(symbol: &str, pct: f64) -> PositionRisk {
    PositionRisk {
        symbol: symbol.to_string(),
        position_size: 1.0,
        risk_amount: 10_000.0 * pct,
        risk_percentage: pct,
        stop_distance_pips: 50.0,
        correlation_factor: 1.0,
    }
}

#[test]
fn sizing_follows_the_risk_fraction() {
    // 10k balance, aggressive 2% risk = $200; 50-pip stop at $10/pip/lot
    // puts $500 at risk per lot, so 0.40 lots.
    let rm = RiskManager::new(RiskProfile::Aggressive, 10_000.0);
    let (lots, position) = rm.calculate_position_size("EURUSD", 1.1000, 1.0950);
    assert!((lots - 0.40).abs() < 1e-9);
    assert!((position.stop_distance_pips - 50.0).abs() < 1e-6);
    assert!((position.risk_percentage - 0.02).abs() < 1e-6);
}

#[test]
fn jpy_pairs_use_their_pip_size() {
    let rm = RiskManager::new(RiskProfile::Aggressive, 10_000.0);
    // 0.50 price distance on USDJPY = 50 pips.
    let (_, position) = rm.calculate_position_size("USDJPY", 150.00, 149.50);
    assert!((position.stop_distance_pips - 50.0).abs() < 1e-6);
}

#[test]
fn degenerate_stop_falls_back_to_minimum_lot() {
    let rm = RiskManager::new(RiskProfile::Moderate, 10_000.0);
    let (lots, _) = rm.calculate_position_size("EURUSD", 1.1000, 1.1000);
    assert_eq!(lots, 0.01);
}

#[test]
fn lot_size_is_clamped_to_broker_limits() {
    // Tiny stop: raw size explodes, clamps to the broker max.
    let rm = RiskManager::new(RiskProfile::Aggressive, 1_000_000.0).with_broker_max_lot(50.0);
    let (lots, _) = rm.calculate_position_size("EURUSD", 1.10000, 1.09990);
    assert_eq!(lots, 50.0);

    // Micro balance: raw size rounds to zero, clamps to the minimum.
    let rm = RiskManager::new(RiskProfile::Conservative, 20.0);
    let (lots, _) = rm.calculate_position_size("EURUSD", 1.1000, 1.0900);
    assert_eq!(lots, 0.01);
}

#[test]
fn position_cap_blocks_the_sixth_aggressive_position() {
    let mut rm = RiskManager::new(RiskProfile::Aggressive, 10_000.0);
    for (i, sym) in ["EURUSD", "GBPUSD", "USDJPY", "AUDUSD", "USDCAD"]
        .iter()
        .enumerate()
    {
        let added = rm.add_position(risk(sym, 0.017));
        assert!(added, "position {} should register", i);
    }
    assert_eq!(rm.open_position_count(), 5);

    let check = rm.can_trade("NZDUSD");
    assert!(!check.can_trade);
    assert!(check.reason.contains("position cap"));
}

#[test]
fn portfolio_risk_cap_blocks_even_below_the_position_cap() {
    let mut rm = RiskManager::new(RiskProfile::Aggressive, 10_000.0);
    rm.add_position(risk("EURUSD", 0.045));
    rm.add_position(risk("GBPUSD", 0.04));
    // 8.5% open; a 2% addition would exceed the 10% portfolio cap.
    let check = rm.can_trade("USDJPY");
    assert!(!check.can_trade);
    assert!(check.reason.contains("portfolio risk"));
}

#[test]
fn add_position_refuses_to_breach_the_portfolio_cap() {
    let mut rm = RiskManager::new(RiskProfile::Aggressive, 10_000.0);
    assert!(rm.add_position(risk("EURUSD", 0.06)));
    assert!(!rm.add_position(risk("GBPUSD", 0.06)));
    assert!(rm.open_risk_percentage() <= rm.params().max_portfolio_risk + 1e-9);
}

#[test]
fn risk_tally_follows_add_and_remove() {
    let mut rm = RiskManager::new(RiskProfile::Moderate, 10_000.0);
    rm.add_position(risk("EURUSD", 0.015));
    rm.add_position(risk("GBPUSD", 0.01));
    assert!((rm.open_risk_percentage() - 0.025).abs() < 1e-9);

    rm.remove_position("EURUSD");
    assert!((rm.open_risk_percentage() - 0.01).abs() < 1e-9);
    assert!(rm.remove_position("EURUSD").is_none());
}

#[test]
fn per_symbol_cap_blocks_duplicates() {
    let mut rm = RiskManager::new(RiskProfile::Aggressive, 10_000.0);
    rm.add_position(risk("EURUSD", 0.02));
    let check = rm.can_trade("EURUSD");
    assert!(!check.can_trade);
    assert!(check.reason.contains("symbol cap"));
}

#[test]
fn daily_limit_blocks_after_reset_allows() {
    let mut rm = RiskManager::new(RiskProfile::Aggressive, 10_000.0).with_daily_limit(2);
    rm.add_position(risk("EURUSD", 0.01));
    rm.add_position(risk("GBPUSD", 0.01));
    assert_eq!(rm.daily_trade_count(), 2);

    let check = rm.can_trade("USDJPY");
    assert!(!check.can_trade);
    assert!(check.reason.contains("daily trade limit"));

    rm.remove_position("EURUSD");
    rm.remove_position("GBPUSD");
    rm.reset_daily_counts();
    assert!(rm.can_trade("USDJPY").can_trade);
}

#[test]
fn low_balance_blocks_trading() {
    let rm = RiskManager::new(RiskProfile::Conservative, 5.0).with_min_balance(10.0);
    let check = rm.can_trade("EURUSD");
    assert!(!check.can_trade);
    assert!(check.reason.contains("below minimum"));
}

#[test]
fn broker_sync_seeds_estimated_risk() {
    let mut rm = RiskManager::new(RiskProfile::Aggressive, 10_000.0);
    rm.sync_position("EURUSD", 2.0);
    assert_eq!(rm.open_position_count(), 1);
    assert!((rm.open_risk_percentage() - 0.03).abs() < 1e-9);
}

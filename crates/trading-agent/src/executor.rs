use std::sync::Arc;

use analysis_core::{pip_size, SignalType};
use broker_trait::{
    BrokerClient, BrokerError, OrderKind, OrderRequest, OrderResult, OrderSide, SymbolInfo,
};
use multi_timeframe::Recommendation;
use signal_engine::EntryDetails;

/// Minimum risk:reward after broker-mandated stop adjustments.
const MIN_ADJUSTED_RR: f64 = 2.0;
/// Bound on the order round-trip.
const SUBMIT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);
/// SMC entries within this many pips of the market go out as market orders.
const MARKET_ORDER_PROXIMITY_PIPS: f64 = 2.0;

#[derive(Debug)]
pub enum OrderOutcome {
    Submitted {
        request: OrderRequest,
        result: OrderResult,
    },
    /// Failed local validation; nothing was sent to the broker.
    Rejected { reason: String },
    /// The broker refused the order; classified, logged, never retried.
    BrokerRejected(BrokerError),
}

/// Owns the submit path: one code path per order kind, selected by the
/// distance between the SMC entry and the current market.
pub struct TradeExecutor {
    broker: Arc<dyn BrokerClient>,
    magic_number: u64,
    slippage_pips: f64,
}

impl TradeExecutor {
    pub fn new(broker: Arc<dyn BrokerClient>, magic_number: u64, slippage_pips: f64) -> Self {
        Self {
            broker,
            magic_number,
            slippage_pips,
        }
    }

    /// Validate, adjust for broker stop requirements, pick the order kind,
    /// and submit.
    pub async fn execute(
        &self,
        symbol: &str,
        recommendation: &Recommendation,
        volume: f64,
    ) -> OrderOutcome {
        let Some(entry) = &recommendation.entry_details else {
            return OrderOutcome::Rejected {
                reason: "recommendation carries no entry details".to_string(),
            };
        };
        let side = match recommendation.action {
            SignalType::Buy => OrderSide::Buy,
            SignalType::Sell => OrderSide::Sell,
            SignalType::Wait => {
                return OrderOutcome::Rejected {
                    reason: "wait recommendations are not executable".to_string(),
                }
            }
        };

        let info = match self.broker.symbol_info(symbol).await {
            Ok(info) => info,
            Err(e) => return OrderOutcome::BrokerRejected(e),
        };

        // Re-validate SL/TP direction and broker minimum stop distance;
        // reject when the adjusted trade is no longer worth taking.
        let (stop_loss, take_profit) = match adjust_stop_levels(side, entry, &info) {
            Ok(levels) => levels,
            Err(reason) => {
                tracing::warn!(symbol, %side, reason, "order rejected before submit");
                return OrderOutcome::Rejected { reason };
            }
        };

        let risk = (entry.entry_price - stop_loss).abs();
        let reward = (take_profit - entry.entry_price).abs();
        let adjusted_rr = if risk > 0.0 { reward / risk } else { 0.0 };
        if adjusted_rr < MIN_ADJUSTED_RR {
            let reason = format!(
                "adjusted R:R {:.2} below minimum {:.1}",
                adjusted_rr, MIN_ADJUSTED_RR
            );
            tracing::warn!(symbol, %side, reason, "order rejected before submit");
            return OrderOutcome::Rejected { reason };
        }

        let tick = match self.broker.tick(symbol).await {
            Ok(tick) => tick,
            Err(e) => return OrderOutcome::BrokerRejected(e),
        };
        let market_price = match side {
            OrderSide::Buy => tick.ask,
            OrderSide::Sell => tick.bid,
        };

        let pip = pip_size(symbol);
        let distance_pips = (entry.entry_price - market_price).abs() / pip;
        let (kind, price) = if distance_pips <= MARKET_ORDER_PROXIMITY_PIPS {
            (OrderKind::Market, market_price)
        } else {
            let kind = match side {
                OrderSide::Buy if entry.entry_price > market_price => OrderKind::Stop,
                OrderSide::Buy => OrderKind::Limit,
                OrderSide::Sell if entry.entry_price < market_price => OrderKind::Stop,
                OrderSide::Sell => OrderKind::Limit,
            };
            (kind, entry.entry_price)
        };

        let volume = volume.max(info.volume_min).min(info.volume_max);
        let request = OrderRequest {
            symbol: symbol.to_string(),
            side,
            kind,
            volume,
            price,
            stop_loss,
            take_profit,
            deviation_points: (self.slippage_pips * 10.0).round() as u32,
            magic_number: self.magic_number,
            comment: format!("SMC_{}_{}", side, chrono::Utc::now().format("%H%M%S")),
        };

        tracing::info!(
            symbol,
            %side,
            kind = ?kind,
            volume,
            price = format!("{:.5}", price),
            sl = format!("{:.5}", stop_loss),
            tp = format!("{:.5}", take_profit),
            rr = format!("{:.2}", adjusted_rr),
            "submitting order"
        );

        let submitted = tokio::time::timeout(SUBMIT_TIMEOUT, self.broker.submit_order(&request))
            .await
            .unwrap_or(Err(BrokerError::Timeout));
        match submitted {
            Ok(result) => OrderOutcome::Submitted { request, result },
            Err(e) => {
                tracing::error!(symbol, error = %e, "broker refused order");
                OrderOutcome::BrokerRejected(e)
            }
        }
    }
}

/// Enforce direction and the broker's minimum stop distance. Stops may only
/// widen and targets only move away, so the R:R can degrade and must be
/// re-checked by the caller.
fn adjust_stop_levels(
    side: OrderSide,
    entry: &EntryDetails,
    info: &SymbolInfo,
) -> Result<(f64, f64), String> {
    let min_distance = info.min_stop_distance();
    let e = entry.entry_price;

    match side {
        OrderSide::Buy => {
            if entry.stop_loss >= e {
                return Err(format!(
                    "invalid SL for BUY: {:.5} not below entry {:.5}",
                    entry.stop_loss, e
                ));
            }
            if entry.take_profit <= e {
                return Err(format!(
                    "invalid TP for BUY: {:.5} not above entry {:.5}",
                    entry.take_profit, e
                ));
            }
            let sl = entry.stop_loss.min(e - min_distance);
            let tp = entry.take_profit.max(e + min_distance);
            Ok((sl, tp))
        }
        OrderSide::Sell => {
            if entry.stop_loss <= e {
                return Err(format!(
                    "invalid SL for SELL: {:.5} not above entry {:.5}",
                    entry.stop_loss, e
                ));
            }
            if entry.take_profit >= e {
                return Err(format!(
                    "invalid TP for SELL: {:.5} not below entry {:.5}",
                    entry.take_profit, e
                ));
            }
            let sl = entry.stop_loss.max(e + min_distance);
            let tp = entry.take_profit.min(e - min_distance);
            Ok((sl, tp))
        }
    }
}

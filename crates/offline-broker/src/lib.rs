use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use analysis_core::{pip_size, Bar, Timeframe};
use async_trait::async_trait;
use broker_trait::{
    AccountInfo, BrokerClient, BrokerError, BrokerPosition, OrderRequest, OrderResult, OrderSide,
    SymbolInfo, Tick, RETCODE_DONE,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

/// Offline broker collaborator: serves seeded random-walk OHLCV and fills
/// every order instantly, so the engine runs without a terminal. The core
/// is never linked to synthetic data by default; a host opts into this
/// adapter explicitly.
pub struct OfflineBroker {
    seed: u64,
    spread_pips: f64,
    state: Mutex<OfflineState>,
}

struct OfflineState {
    connected: bool,
    balance: f64,
    series: HashMap<(String, Timeframe), Vec<Bar>>,
    positions: Vec<BrokerPosition>,
    next_ticket: u64,
}

impl OfflineBroker {
    pub fn new() -> Self {
        Self::with_seed(7)
    }

    /// Same seed, same bars: offline runs are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            spread_pips: 1.2,
            state: Mutex::new(OfflineState {
                connected: false,
                balance: 10_000.0,
                series: HashMap::new(),
                positions: Vec::new(),
                next_ticket: 1,
            }),
        }
    }

    pub fn with_balance(mut self, balance: f64) -> Self {
        self.state.get_mut().balance = balance;
        self
    }

    fn base_price(symbol: &str) -> f64 {
        match symbol.to_ascii_uppercase().as_str() {
            s if s.starts_with("EURUSD") => 1.1000,
            s if s.starts_with("GBPUSD") => 1.3000,
            s if s.starts_with("USDJPY") => 150.00,
            s if s.starts_with("AUDUSD") => 0.6500,
            s if s.starts_with("USDCAD") => 1.3500,
            s if s.starts_with("USDCHF") => 0.9000,
            s if s.starts_with("NZDUSD") => 0.6000,
            _ => 1.2000,
        }
    }

    fn series_seed(&self, symbol: &str, timeframe: Timeframe) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        symbol.hash(&mut hasher);
        timeframe.name().hash(&mut hasher);
        hasher.finish()
    }

    /// Random-walk OHLCV with occasional impulsive legs, anchored so the
    /// series ends near the symbol's base price.
    fn generate_series(&self, symbol: &str, timeframe: Timeframe, bars: usize) -> Vec<Bar> {
        let mut rng = StdRng::seed_from_u64(self.series_seed(symbol, timeframe));
        let pip = pip_size(symbol);
        let base = Self::base_price(symbol);
        // Fixed series anchor keeps runs reproducible across wall clocks.
        let end = chrono::DateTime::<Utc>::from_timestamp(1_717_372_800, 0).unwrap_or_default();
        let step = timeframe.to_duration();

        let mut closes = Vec::with_capacity(bars);
        let mut price = base;
        for _ in 0..bars {
            // Impulse roughly every 20 bars, drift otherwise.
            let impulse = rng.gen_ratio(1, 20);
            let magnitude = if impulse {
                rng.gen_range(8.0..25.0)
            } else {
                rng.gen_range(0.5..4.0)
            };
            let direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            price += direction * magnitude * pip;
            // Mean-revert gently toward the base so prices stay plausible.
            price += (base - price) * 0.01;
            closes.push(price);
        }

        let mut out = Vec::with_capacity(bars);
        let mut prev_close = closes.first().copied().unwrap_or(base);
        for (i, &close) in closes.iter().enumerate() {
            let timestamp = end - step * (bars as i32 - i as i32);
            let open = prev_close;
            let wiggle_high = rng.gen_range(0.5..3.0) * pip;
            let wiggle_low = rng.gen_range(0.5..3.0) * pip;
            out.push(Bar {
                timestamp,
                open,
                high: open.max(close) + wiggle_high,
                low: open.min(close) - wiggle_low,
                close,
                volume: rng.gen_range(500.0..5_000.0),
            });
            prev_close = close;
        }
        out
    }

    async fn last_close(&self, symbol: &str) -> f64 {
        let state = self.state.lock().await;
        state
            .series
            .iter()
            .filter(|((s, _), _)| s == symbol)
            .filter_map(|(_, bars)| bars.last())
            .map(|b| b.close)
            .next()
            .unwrap_or_else(|| Self::base_price(symbol))
    }
}

impl Default for OfflineBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for OfflineBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.connected = true;
        tracing::info!(seed = self.seed, "offline broker connected");
        Ok(())
    }

    async fn account_info(&self) -> Result<AccountInfo, BrokerError> {
        let state = self.state.lock().await;
        if !state.connected {
            return Err(BrokerError::NotConnected);
        }
        let balance = Decimal::from_f64(state.balance).unwrap_or_default();
        Ok(AccountInfo {
            login: 0,
            balance,
            equity: balance,
            currency: "USD".to_string(),
        })
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, BrokerError> {
        let price = self.last_close(symbol).await;
        let pip = pip_size(symbol);
        let half_spread = self.spread_pips * pip / 2.0;
        Ok(SymbolInfo {
            symbol: symbol.to_string(),
            bid: price - half_spread,
            ask: price + half_spread,
            spread_pips: self.spread_pips,
            point: pip / 10.0,
            digits: if pip == 0.01 { 3 } else { 5 },
            volume_min: 0.01,
            volume_max: 100.0,
            trade_stops_level: 50,
            pip_value_per_lot: 10.0,
        })
    }

    async fn tick(&self, symbol: &str) -> Result<Tick, BrokerError> {
        let price = self.last_close(symbol).await;
        let half_spread = self.spread_pips * pip_size(symbol) / 2.0;
        Ok(Tick {
            bid: price - half_spread,
            ask: price + half_spread,
            timestamp: Utc::now(),
        })
    }

    async fn rates(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, BrokerError> {
        if count == 0 {
            return Err(BrokerError::NoData(symbol.to_string()));
        }
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(BrokerError::NotConnected);
        }
        let key = (symbol.to_string(), timeframe);
        if !state.series.contains_key(&key) {
            let bars = self.generate_series(symbol, timeframe, count.max(500));
            state.series.insert(key.clone(), bars);
        }
        let bars = &state.series[&key];
        let start = bars.len().saturating_sub(count);
        Ok(bars[start..].to_vec())
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, BrokerError> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(BrokerError::NotConnected);
        }
        if request.volume < 0.01 || request.volume > 100.0 {
            return Err(BrokerError::InvalidVolume);
        }

        // The same stop sanity the terminal would enforce.
        let stops_valid = match request.side {
            OrderSide::Buy => {
                request.stop_loss < request.price && request.price < request.take_profit
            }
            OrderSide::Sell => {
                request.take_profit < request.price && request.price < request.stop_loss
            }
        };
        if !stops_valid {
            return Err(BrokerError::InvalidStops);
        }

        // Instant fill: market at the requested market price, pending at
        // its level.
        let fill_price = request.price;
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.positions.push(BrokerPosition {
            ticket,
            symbol: request.symbol.clone(),
            side: request.side,
            volume: request.volume,
            open_price: fill_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            open_time: Utc::now(),
            profit: 0.0,
            magic_number: request.magic_number,
            comment: request.comment.clone(),
        });

        tracing::info!(
            symbol = %request.symbol,
            side = %request.side,
            kind = ?request.kind,
            volume = request.volume,
            price = fill_price,
            ticket,
            "offline order filled"
        );

        Ok(OrderResult {
            retcode: RETCODE_DONE,
            order_id: ticket,
            fill_price,
            fill_volume: request.volume,
        })
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let state = self.state.lock().await;
        Ok(state.positions.clone())
    }

    async fn shutdown(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.connected = false;
        Ok(())
    }

    fn is_offline(&self) -> bool {
        true
    }

    fn broker_name(&self) -> &str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_trait::OrderKind;

    #[tokio::test]
    async fn rates_are_ordered_and_reproducible() {
        let broker = OfflineBroker::with_seed(42);
        broker.connect().await.unwrap();
        let a = broker.rates("EURUSD", Timeframe::H1, 300).await.unwrap();
        assert_eq!(a.len(), 300);
        for pair in a.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
            assert!(pair[1].high >= pair[1].low);
        }

        let other = OfflineBroker::with_seed(42);
        other.connect().await.unwrap();
        let b = other.rates("EURUSD", Timeframe::H1, 300).await.unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.close, y.close);
        }
    }

    #[tokio::test]
    async fn disconnected_broker_refuses_calls() {
        let broker = OfflineBroker::new();
        let err = broker.rates("EURUSD", Timeframe::H1, 10).await.unwrap_err();
        assert_eq!(err, BrokerError::NotConnected);
    }

    #[tokio::test]
    async fn orders_with_inverted_stops_are_rejected() {
        let broker = OfflineBroker::new();
        broker.connect().await.unwrap();
        let request = OrderRequest {
            symbol: "EURUSD".to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Market,
            volume: 0.10,
            price: 1.1000,
            stop_loss: 1.1050, // above entry on a buy
            take_profit: 1.1100,
            deviation_points: 10,
            magic_number: 142536,
            comment: "test".to_string(),
        };
        let err = broker.submit_order(&request).await.unwrap_err();
        assert_eq!(err, BrokerError::InvalidStops);
    }

    #[tokio::test]
    async fn filled_orders_appear_as_positions() {
        let broker = OfflineBroker::new();
        broker.connect().await.unwrap();
        let request = OrderRequest {
            symbol: "EURUSD".to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Market,
            volume: 0.10,
            price: 1.1000,
            stop_loss: 1.0950,
            take_profit: 1.1100,
            deviation_points: 10,
            magic_number: 142536,
            comment: "test".to_string(),
        };
        let result = broker.submit_order(&request).await.unwrap();
        assert!(result.is_done());

        let positions = broker.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticket, result.order_id);
        assert_eq!(positions[0].side, OrderSide::Buy);
    }

    #[tokio::test]
    async fn jpy_symbols_get_jpy_pricing() {
        let broker = OfflineBroker::new();
        broker.connect().await.unwrap();
        let info = broker.symbol_info("USDJPY").await.unwrap();
        assert_eq!(info.digits, 3);
        assert!(info.bid > 100.0);
    }
}

use std::collections::HashMap;
use std::fmt;

use crate::config::DecisionConfig;
use crate::models::{Order, OrderSide};
use crate::store::PriceStore;

/// Outcome of evaluating one price observation
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Hold,
    Submit(Order),
}

impl Decision {
    pub fn order(&self) -> Option<&Order> {
        match self {
            Decision::Hold => None,
            Decision::Submit(order) => Some(order),
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, Decision::Hold)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Hold => f.write_str("HOLD"),
            Decision::Submit(order) => write!(f, "{}", order),
        }
    }
}

/// Round a price to cents for order submission
pub fn round_to_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// Threshold strategy with a per-instrument position
///
/// - price below `buy_threshold` while flat or short: buy `lot_size`, position becomes `+lot_size`
/// - price above `sell_threshold` while long: sell the whole position, position becomes 0
/// - anything else: hold
///
/// The position is updated as soon as the decision is made; it is not
/// rolled back if the relay later rejects the order.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: DecisionConfig,
    positions: HashMap<String, i64>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            positions: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Current signed position (0 when never traded)
    pub fn position(&self, instrument: &str) -> i64 {
        self.positions.get(instrument).copied().unwrap_or(0)
    }

    pub fn positions(&self) -> &HashMap<String, i64> {
        &self.positions
    }

    pub fn evaluate(&mut self, instrument: &str, price: f64) -> Decision {
        let position = self.position(instrument);

        if price < self.config.buy_threshold && position <= 0 {
            let lot = i64::try_from(self.config.lot_size).unwrap_or(i64::MAX);
            self.positions.insert(instrument.to_string(), lot);
            return Decision::Submit(Order::new(
                instrument,
                OrderSide::Buy,
                self.config.lot_size,
                round_to_cents(price),
            ));
        }

        if price > self.config.sell_threshold && position > 0 {
            self.positions.insert(instrument.to_string(), 0);
            return Decision::Submit(Order::new(
                instrument,
                OrderSide::Sell,
                position.unsigned_abs(),
                round_to_cents(price),
            ));
        }

        Decision::Hold
    }

    /// Evaluate the latest stored price, `None` if the instrument has no price yet
    pub fn evaluate_latest(&mut self, store: &PriceStore, instrument: &str) -> Option<Decision> {
        store
            .get(instrument)
            .map(|price| self.evaluate(instrument, price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DecisionConfig {
            buy_threshold: 100.0,
            sell_threshold: 105.0,
            lot_size: 10,
        })
    }

    fn run(engine: &mut DecisionEngine, prices: &[f64]) -> Vec<Decision> {
        prices.iter().map(|p| engine.evaluate("AAPL", *p)).collect()
    }

    #[test]
    fn test_buy_hold_sell_cycle() {
        let mut engine = engine();
        let decisions = run(&mut engine, &[95.0, 101.0, 106.0]);

        assert_eq!(
            decisions,
            vec![
                Decision::Submit(Order::new("AAPL", OrderSide::Buy, 10, 95.0)),
                Decision::Hold,
                Decision::Submit(Order::new("AAPL", OrderSide::Sell, 10, 106.0)),
            ]
        );
        assert_eq!(engine.position("AAPL"), 0);
    }

    #[test]
    fn test_prices_inside_band_only_hold() {
        let mut engine = engine();
        let decisions = run(&mut engine, &[101.0, 102.0, 104.0, 100.0, 105.0]);
        assert!(decisions.iter().all(Decision::is_hold));
        assert_eq!(engine.position("AAPL"), 0);
    }

    #[test]
    fn test_no_second_buy_while_long() {
        let mut engine = engine();
        let decisions = run(&mut engine, &[99.0, 98.0, 97.0]);
        assert!(matches!(decisions[0], Decision::Submit(_)));
        assert!(decisions[1].is_hold() && decisions[2].is_hold());
        assert_eq!(engine.position("AAPL"), 10);
    }

    #[test]
    fn test_sell_needs_a_long_position() {
        let mut engine = engine();
        assert!(engine.evaluate("AAPL", 110.0).is_hold());
        assert_eq!(engine.position("AAPL"), 0);
    }

    #[test]
    fn test_positions_are_per_instrument() {
        let mut engine = engine();
        engine.evaluate("AAPL", 90.0);
        assert_eq!(engine.position("AAPL"), 10);
        assert_eq!(engine.position("MSFT"), 0);

        let decision = engine.evaluate("MSFT", 90.0);
        assert_eq!(decision.order().map(|o| o.side), Some(OrderSide::Buy));
    }

    #[test]
    fn test_order_price_rounded_to_cents() {
        let mut engine = engine();
        let decision = engine.evaluate("AAPL", 99.4567);
        assert_eq!(decision.order().unwrap().price, 99.46);
        assert_eq!(decision.to_string(), "BUY 10 AAPL @ 99.46");
    }

    #[test]
    fn test_evaluate_latest_reads_store() {
        let mut engine = engine();
        let store = PriceStore::new();
        assert!(engine.evaluate_latest(&store, "AAPL").is_none());

        store.set("AAPL", 96.0).unwrap();
        let decision = engine.evaluate_latest(&store, "AAPL").unwrap();
        assert_eq!(decision.order().unwrap().qty, 10);
    }
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{Tick, MAX_SENTIMENT};

/// Base price every instrument starts from
pub const BASE_PRICE: f64 = 100.0;

/// Width of the random band added to [`BASE_PRICE`] at start
pub const INITIAL_SPREAD: f64 = 10.0;

/// Largest absolute move per tick
pub const MAX_STEP: f64 = 0.25;

/// Bounded random walk over a fixed set of instruments
///
/// Each call to [`PriceWalk::advance`] moves every price by a step drawn
/// from `[-MAX_STEP, MAX_STEP)` and returns one PRICE tick per instrument in
/// configuration order. Prices are floored at zero.
#[derive(Debug)]
pub struct PriceWalk {
    prices: Vec<(String, f64)>,
    rng: StdRng,
    max_step: f64,
}

impl PriceWalk {
    /// Walk seeded from the OS entropy source
    pub fn new<I, S>(instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_rng(instruments, StdRng::from_os_rng())
    }

    /// Deterministic walk for tests and replays
    pub fn seeded<I, S>(instruments: I, seed: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_rng(instruments, StdRng::seed_from_u64(seed))
    }

    fn with_rng<I, S>(instruments: I, mut rng: StdRng) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prices = instruments
            .into_iter()
            .map(|symbol| {
                let start = BASE_PRICE + rng.random_range(0.0..INITIAL_SPREAD);
                (symbol.into(), start)
            })
            .collect();

        Self {
            prices,
            rng,
            max_step: MAX_STEP,
        }
    }

    /// Move every price one step and return the resulting ticks
    pub fn advance(&mut self) -> Vec<Tick> {
        let max_step = self.max_step;
        self.prices
            .iter_mut()
            .map(|(instrument, price)| {
                let step = self.rng.random_range(-max_step..max_step);
                *price = (*price + step).max(0.0);
                Tick::price(instrument.clone(), *price)
            })
            .collect()
    }

    /// Draw a news sentiment in `0..=100`
    pub fn sentiment(&mut self) -> Tick {
        Tick::news(self.rng.random_range(0..=MAX_SENTIMENT))
    }

    /// Current prices without advancing
    pub fn prices(&self) -> &[(String, f64)] {
        &self.prices
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.prices.iter().map(|(symbol, _)| symbol.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_prices_within_band() {
        let walk = PriceWalk::seeded(["AAPL", "MSFT", "GOOG"], 1);
        let symbols: Vec<&str> = walk.instruments().collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT", "GOOG"]);

        for (_, price) in walk.prices() {
            assert!(*price >= BASE_PRICE && *price < BASE_PRICE + INITIAL_SPREAD);
        }
    }

    #[test]
    fn test_steps_are_bounded() {
        let mut walk = PriceWalk::seeded(["AAPL", "MSFT"], 42);

        for _ in 0..1000 {
            let before: Vec<f64> = walk.prices().iter().map(|(_, p)| *p).collect();
            let ticks = walk.advance();
            assert_eq!(ticks.len(), 2);

            for (tick, prev) in ticks.iter().zip(before) {
                let Tick::Price { price, .. } = tick else {
                    panic!("expected a price tick");
                };
                assert!((price - prev).abs() <= MAX_STEP + 1e-9);
                assert!(*price >= 0.0);
            }
        }
    }

    #[test]
    fn test_price_never_negative() {
        let mut walk = PriceWalk::seeded(["PENNY"], 9);
        walk.prices[0].1 = 0.1;

        for _ in 0..10_000 {
            for tick in walk.advance() {
                if let Tick::Price { price, .. } = tick {
                    assert!(price >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_same_seed_same_walk() {
        let mut a = PriceWalk::seeded(["AAPL"], 7);
        let mut b = PriceWalk::seeded(["AAPL"], 7);
        for _ in 0..50 {
            assert_eq!(a.advance(), b.advance());
        }
        assert_eq!(a.sentiment(), b.sentiment());
    }

    #[test]
    fn test_sentiment_range() {
        let mut walk = PriceWalk::seeded(Vec::<String>::new(), 3);
        for _ in 0..500 {
            match walk.sentiment() {
                Tick::News { sentiment } => assert!(sentiment <= MAX_SENTIMENT),
                other => panic!("unexpected tick {:?}", other),
            }
        }
    }
}

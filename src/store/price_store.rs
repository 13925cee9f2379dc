use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

use crate::error::StoreError;

/// Concurrent instrument -> latest price map
///
/// Backed by a sharded [`DashMap`], so readers and writers of different
/// instruments only contend when they hash to the same shard, and a read of
/// an instrument never sees a half-written price. Share it with
/// `Arc<PriceStore>`; there is no global instance.
///
/// A store built with [`PriceStore::with_instruments`] tracks a closed set
/// and refuses writes for anything else. [`PriceStore::new`] accepts any
/// instrument and creates it on first write.
#[derive(Debug, Default)]
pub struct PriceStore {
    prices: DashMap<String, f64>,
    /// `None` = open store
    tracked: Option<HashSet<String>>,
}

impl PriceStore {
    /// Create an open store that accepts any instrument
    pub fn new() -> Self {
        Self {
            prices: DashMap::new(),
            tracked: None,
        }
    }

    /// Create a store restricted to a fixed set of instruments
    pub fn with_instruments<I, S>(instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tracked: HashSet<String> = instruments.into_iter().map(Into::into).collect();
        Self {
            prices: DashMap::with_capacity(tracked.len()),
            tracked: Some(tracked),
        }
    }

    /// Install a new latest price for `instrument`
    pub fn set(&self, instrument: &str, price: f64) -> Result<(), StoreError> {
        if let Some(tracked) = &self.tracked {
            if !tracked.contains(instrument) {
                return Err(StoreError::UnknownInstrument(instrument.to_string()));
            }
        }
        if !price.is_finite() || price < 0.0 {
            return Err(StoreError::InvalidPrice {
                instrument: instrument.to_string(),
                price,
            });
        }

        // Avoid allocating a key on the hot path once the entry exists
        if let Some(mut entry) = self.prices.get_mut(instrument) {
            *entry = price;
        } else {
            self.prices.insert(instrument.to_string(), price);
        }
        Ok(())
    }

    /// Latest price, or `None` if the instrument was never written
    pub fn get(&self, instrument: &str) -> Option<f64> {
        self.prices.get(instrument).map(|entry| *entry)
    }

    /// Copy of every instrument's latest price
    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.prices
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Whether `instrument` may be written to this store
    pub fn is_tracked(&self, instrument: &str) -> bool {
        self.tracked
            .as_ref()
            .map(|tracked| tracked.contains(instrument))
            .unwrap_or(true)
    }

    /// Number of instruments that have a price
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_then_get() {
        let store = PriceStore::new();
        store.set("AAPL", 150.0).unwrap();
        assert_eq!(store.get("AAPL"), Some(150.0));
    }

    #[test]
    fn test_unset_instrument() {
        let store = PriceStore::new();
        assert_eq!(store.get("UNSET"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_latest_write_wins() {
        let store = PriceStore::new();
        store.set("MSFT", 300.0).unwrap();
        store.set("GOOG", 120.0).unwrap();
        store.set("MSFT", 301.5).unwrap();
        assert_eq!(store.get("MSFT"), Some(301.5));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_closed_store_rejects_unknown_instrument() {
        let store = PriceStore::with_instruments(["AAPL", "MSFT"]);
        assert!(store.set("AAPL", 1.0).is_ok());
        assert_eq!(
            store.set("TSLA", 1.0),
            Err(StoreError::UnknownInstrument("TSLA".to_string()))
        );
        assert!(!store.is_tracked("TSLA"));
        assert_eq!(store.get("TSLA"), None);
    }

    #[test]
    fn test_invalid_prices_rejected() {
        let store = PriceStore::new();
        assert!(store.set("AAPL", -0.01).is_err());
        assert!(store.set("AAPL", f64::NAN).is_err());
        assert_eq!(store.get("AAPL"), None);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = PriceStore::new();
        store.set("AAPL", 1.0).unwrap();
        let snapshot = store.snapshot();
        store.set("AAPL", 2.0).unwrap();

        assert_eq!(snapshot.get("AAPL"), Some(&1.0));
        assert_eq!(store.get("AAPL"), Some(2.0));
    }

    #[test]
    fn test_concurrent_writers_on_disjoint_keys() {
        const THREADS: usize = 8;
        const WRITES: usize = 1_000;

        let store = Arc::new(PriceStore::new());

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let key = format!("SYM{}", t);
                    for i in 0..WRITES {
                        store.set(&key, (t * WRITES + i) as f64).unwrap();
                        // Own writes are always visible in program order
                        assert_eq!(store.get(&key), Some((t * WRITES + i) as f64));
                    }
                })
            })
            .collect();

        // Concurrent readers never see anything but a value some writer stored
        let reader = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..WRITES {
                    for (key, price) in store.snapshot() {
                        let t: usize = key.trim_start_matches("SYM").parse().unwrap();
                        assert!(price >= (t * WRITES) as f64 && price < ((t + 1) * WRITES) as f64);
                    }
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        reader.join().unwrap();

        for t in 0..THREADS {
            let expected = (t * WRITES + WRITES - 1) as f64;
            assert_eq!(store.get(&format!("SYM{}", t)), Some(expected));
        }
    }
}

//! Per-symbol last-price cache (spec.md §4.4).
//!
//! Polling only — no websockets. `refresh` pulls `fetch_all_ticker_prices`
//! from the adapter for a fixed allow-list plus whatever symbols the active
//! orders need, and 24h change is derived from comparing the freshest
//! snapshot against the one before it, rather than a second call to a
//! separate futures endpoint.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::GridCoreResult;
use crate::exchange::ExchangeAdapter;
use crate::model::Exchange;

const STALE_AFTER: Duration = Duration::from_secs(30);
const DEFAULT_SYMBOLS: &[&str] = &["ASTERUSDT", "BTCUSDT", "ETHUSDT", "BNBUSDT"];

#[derive(Debug, Clone, Copy)]
struct PriceEntry {
    price: Decimal,
    previous_price: Option<Decimal>,
    updated_at: Instant,
}

impl PriceEntry {
    fn change_percent(&self) -> Option<Decimal> {
        let previous = self.previous_price?;
        if previous.is_zero() {
            return None;
        }
        Some((self.price - previous) / previous * Decimal::from(100))
    }
}

/// Last-price-per-symbol cache, keyed by `(wallet, exchange, symbol)` since a
/// paper wallet and a live wallet on the same exchange may legitimately see
/// different quotes in a test harness.
#[derive(Default)]
pub struct PriceFeed {
    entries: RwLock<HashMap<(String, Exchange, String), PriceEntry>>,
}

impl PriceFeed {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Refresh all tracked symbols for `(wallet, exchange)`: the fixed
    /// allow-list plus `extra_symbols` (normally the active orders' symbols).
    pub async fn refresh(
        &self,
        adapter: &Arc<dyn ExchangeAdapter>,
        wallet: &str,
        extra_symbols: &[String],
    ) -> GridCoreResult<()> {
        let prices = adapter.fetch_all_ticker_prices().await?;
        let exchange = adapter.exchange();
        let mut wanted: Vec<String> = DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect();
        wanted.extend(extra_symbols.iter().cloned());

        let mut entries = self.entries.write().await;
        for symbol in wanted {
            let Some(price) = prices.get(&symbol).copied() else { continue };
            let key = (wallet.to_string(), exchange, symbol);
            let previous_price = entries.get(&key).map(|e| e.price);
            entries.insert(key, PriceEntry { price, previous_price, updated_at: Instant::now() });
        }
        Ok(())
    }

    /// Last known price for `symbol` under `(wallet, exchange)`, or `0` if
    /// never observed (spec.md §4.4).
    pub async fn get_price(&self, wallet: &str, exchange: Exchange, symbol: &str) -> Decimal {
        let entries = self.entries.read().await;
        entries.get(&(wallet.to_string(), exchange, symbol.to_string())).map(|e| e.price).unwrap_or(Decimal::ZERO)
    }

    /// Percent change between the two most recent observed prices, or `None`
    /// if fewer than two observations exist yet.
    pub async fn get_change_percent(&self, wallet: &str, exchange: Exchange, symbol: &str) -> Option<Decimal> {
        let entries = self.entries.read().await;
        entries.get(&(wallet.to_string(), exchange, symbol.to_string())).and_then(|e| e.change_percent())
    }

    /// True when the symbol has never been observed, or its last observation
    /// is older than 30s.
    pub async fn is_stale(&self, wallet: &str, exchange: Exchange, symbol: &str) -> bool {
        let entries = self.entries.read().await;
        match entries.get(&(wallet.to_string(), exchange, symbol.to_string())) {
            Some(e) => e.updated_at.elapsed() >= STALE_AFTER,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::paper::PaperBroker;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn unknown_symbol_reports_zero_and_stale() {
        let feed = PriceFeed::new();
        assert_eq!(feed.get_price("w1", Exchange::Asterdex, "BTCUSDT").await, Decimal::ZERO);
        assert!(feed.is_stale("w1", Exchange::Asterdex, "BTCUSDT").await);
    }

    #[tokio::test]
    async fn refresh_picks_up_adapter_prices_and_tracks_change() {
        let paper = Arc::new(PaperBroker::new(Exchange::Asterdex));
        paper.set_price("BTCUSDT", dec!(50000)).await;
        let broker: Arc<dyn ExchangeAdapter> = paper.clone();

        let feed = PriceFeed::new();
        feed.refresh(&broker, "w1", &["BTCUSDT".to_string()]).await.unwrap();
        assert_eq!(feed.get_price("w1", Exchange::Asterdex, "BTCUSDT").await, dec!(50000));
        assert!(feed.get_change_percent("w1", Exchange::Asterdex, "BTCUSDT").await.is_none());

        paper.set_price("BTCUSDT", dec!(51000)).await;
        feed.refresh(&broker, "w1", &["BTCUSDT".to_string()]).await.unwrap();
        assert_eq!(feed.get_change_percent("w1", Exchange::Asterdex, "BTCUSDT").await, Some(dec!(2)));
    }
}

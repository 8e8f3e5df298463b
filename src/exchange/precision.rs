//! Per-symbol precision cache.
//!
//! `exchangeInfo` results are cached for 5 minutes (spec.md §4.3). Stable
//! quote assets (USDT/USDC/BUSD/DAI) always get `quote_precision := 2`
//! regardless of what the exchange reports — their wire precision tends to
//! wobble between 2 and 8 digits depending on exchange mood, and 2 is what
//! actually matters for a `quoteOrderQty` market buy.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const STABLE_QUOTES: &[&str] = &["USDT", "USDC", "BUSD", "DAI"];

/// Trading rules for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct SymbolPrecision {
    pub step_size: Decimal,
    pub tick_size: Decimal,
    pub quote_precision: u32,
    pub base_precision: u32,
    pub min_notional: Decimal,
}

impl SymbolPrecision {
    /// Override `quote_precision` to 2 when `quote_asset` is a stable coin,
    /// regardless of what the exchange reported.
    pub fn with_stable_quote_override(mut self, quote_asset: &str) -> Self {
        if STABLE_QUOTES.iter().any(|s| s.eq_ignore_ascii_case(quote_asset)) {
            self.quote_precision = 2;
        }
        self
    }
}

/// Normalize a symbol for matching: BingX may report `ETH-USDT`; strip `-`
/// and `_`, uppercase. Aster matches exactly on uppercase, which this
/// normalization is a no-op for.
pub fn normalize_symbol(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_uppercase()
}

struct CacheEntry {
    precision: SymbolPrecision,
    fetched_at: Instant,
}

/// A 5-minute-TTL, read-mostly cache of per-symbol precision, keyed by
/// normalized symbol.
#[derive(Default)]
pub struct PrecisionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl PrecisionCache {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    pub async fn get(&self, symbol: &str) -> Option<SymbolPrecision> {
        let key = normalize_symbol(symbol);
        let entries = self.entries.read().await;
        entries.get(&key).and_then(|e| {
            if e.fetched_at.elapsed() < CACHE_TTL {
                Some(e.precision)
            } else {
                None
            }
        })
    }

    pub async fn is_expired(&self, symbol: &str) -> bool {
        self.get(symbol).await.is_none()
    }

    pub async fn put(&self, symbol: &str, precision: SymbolPrecision) {
        let key = normalize_symbol(symbol);
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry { precision, fetched_at: Instant::now() });
    }
}

/// A 5-minute-TTL cache of the full `exchangeInfo` symbol list, used by
/// `validate_symbol_for_trading` to check `TRADING` status and list
/// alternates without a fresh HTTP round trip on every `PlaceSpotBuy` call.
#[derive(Default)]
pub struct SymbolInfoCache {
    entries: RwLock<Option<(Instant, Vec<super::SymbolInfo>)>>,
}

impl SymbolInfoCache {
    pub fn new() -> Self {
        Self { entries: RwLock::new(None) }
    }

    pub async fn get(&self) -> Option<Vec<super::SymbolInfo>> {
        let entries = self.entries.read().await;
        entries.as_ref().and_then(|(fetched_at, symbols)| {
            if fetched_at.elapsed() < CACHE_TTL {
                Some(symbols.clone())
            } else {
                None
            }
        })
    }

    pub async fn put(&self, symbols: Vec<super::SymbolInfo>) {
        let mut entries = self.entries.write().await;
        *entries = Some((Instant::now(), symbols));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalizes_bingx_dashes_and_case() {
        assert_eq!(normalize_symbol("eth-usdt"), "ETHUSDT");
        assert_eq!(normalize_symbol("ETH_USDT"), "ETHUSDT");
        assert_eq!(normalize_symbol("BTCUSDT"), "BTCUSDT");
    }

    #[test]
    fn stable_quote_forces_two_decimals() {
        let p = SymbolPrecision {
            step_size: dec!(0.00001),
            tick_size: dec!(0.01),
            quote_precision: 6,
            base_precision: 5,
            min_notional: dec!(5),
        }
        .with_stable_quote_override("USDT");
        assert_eq!(p.quote_precision, 2);
    }

    #[tokio::test]
    async fn cache_round_trips_within_ttl() {
        let cache = PrecisionCache::new();
        let p = SymbolPrecision {
            step_size: dec!(0.0001),
            tick_size: dec!(0.01),
            quote_precision: 2,
            base_precision: 4,
            min_notional: dec!(5),
        };
        cache.put("BTC-USDT", p).await;
        assert!(cache.get("BTCUSDT").await.is_some());
        assert!(!cache.is_expired("btc_usdt").await);
    }
}

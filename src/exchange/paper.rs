//! Paper-trading broker (spec.md §4.3, `paper_trading` runtime flag).
//!
//! Bypasses HTTP entirely: balances live in an in-memory ledger seeded per
//! wallet, orders fill instantly at the quoted price with a synthetic
//! `paper-<ts>-<seq>` order id, and precision is a fixed, generous default
//! rather than a real exchange's `exchangeInfo`. Useful for the scenario
//! tests in `tests/scenarios.rs` and for a user who wants to watch the
//! engine's decisions without risking funds.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use super::{ExchangeAdapter, PlaceOrderResult, SymbolInfo, SymbolPrecision};
use crate::error::GridCoreResult;
use crate::model::{Exchange, UserSettings};

const DEFAULT_PRECISION: SymbolPrecision = SymbolPrecision {
    step_size: dec!(0.00000001),
    tick_size: dec!(0.01),
    quote_precision: 2,
    base_precision: 8,
    min_notional: dec!(5),
};

/// One paper wallet's per-currency balances.
type Ledger = HashMap<String, Decimal>;

/// A synthetic broker that fills every order immediately at the price it is
/// asked to fill at, backed by an in-process balance ledger keyed by wallet
/// address string.
pub struct PaperBroker {
    exchange: Exchange,
    ledgers: RwLock<HashMap<String, Ledger>>,
    prices: RwLock<HashMap<String, Decimal>>,
    seq: AtomicU64,
    default_seed: Decimal,
}

impl PaperBroker {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            ledgers: RwLock::new(HashMap::new()),
            prices: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            default_seed: dec!(10000),
        }
    }

    /// Seed `wallet`'s paper ledger with `amount` of `currency`, creating the
    /// wallet entry if absent. Used by test fixtures and by a fresh paper
    /// wallet's first sync.
    pub async fn seed_balance(&self, wallet: &str, currency: &str, amount: Decimal) {
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers.entry(wallet.to_string()).or_default();
        ledger.insert(currency.to_string(), amount);
    }

    /// Record the last known price for `symbol`, used only so
    /// `fetch_all_ticker_prices` has something to report; the engine always
    /// passes its own `expected_price` into `place_spot_buy`/`place_spot_sell`.
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    fn wallet_key(wallet_settings: Option<&UserSettings>) -> String {
        wallet_settings.map(|s| s.wallet_address.as_str().to_string()).unwrap_or_else(|| "default".to_string())
    }

    async fn ensure_seeded(&self, wallet_key: &str) {
        let mut ledgers = self.ledgers.write().await;
        ledgers.entry(wallet_key.to_string()).or_insert_with(|| {
            let mut ledger = Ledger::new();
            ledger.insert("USDT".to_string(), self.default_seed);
            ledger
        });
    }

    fn next_order_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis();
        format!("paper-{now_ms}-{seq}")
    }

    fn split_symbol(symbol: &str) -> (String, String) {
        for quote in ["USDT", "USDC", "BUSD", "DAI"] {
            if let Some(base) = symbol.strip_suffix(quote) {
                if !base.is_empty() {
                    return (base.to_string(), quote.to_string());
                }
            }
        }
        (symbol.to_string(), "USDT".to_string())
    }
}

#[async_trait]
impl ExchangeAdapter for PaperBroker {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    async fn fetch_exchange_info(&self) -> GridCoreResult<Vec<SymbolInfo>> {
        Ok(Vec::new())
    }

    async fn fetch_all_ticker_prices(&self) -> GridCoreResult<HashMap<String, Decimal>> {
        Ok(self.prices.read().await.clone())
    }

    async fn fetch_spot_account(&self, wallet_settings: Option<&UserSettings>) -> GridCoreResult<HashMap<String, Decimal>> {
        let wallet_key = Self::wallet_key(wallet_settings);
        self.ensure_seeded(&wallet_key).await;
        Ok(self.ledgers.read().await.get(&wallet_key).cloned().unwrap_or_default())
    }

    async fn place_spot_buy(
        &self,
        wallet_settings: Option<&UserSettings>,
        symbol: &str,
        _base_asset: &str,
        _quote_asset: &str,
        quote_amount: Decimal,
        expected_price: Decimal,
    ) -> GridCoreResult<PlaceOrderResult> {
        let wallet_key = Self::wallet_key(wallet_settings);
        self.ensure_seeded(&wallet_key).await;
        let (base_asset, quote_asset) = Self::split_symbol(symbol);
        let filled_qty = quote_amount / expected_price;

        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers.entry(wallet_key).or_default();
        *ledger.entry(quote_asset).or_insert(Decimal::ZERO) -= quote_amount;
        *ledger.entry(base_asset).or_insert(Decimal::ZERO) += filled_qty;

        Ok(PlaceOrderResult { order_id: self.next_order_id(), executed_qty: filled_qty, avg_price: expected_price })
    }

    async fn place_spot_sell(
        &self,
        wallet_settings: Option<&UserSettings>,
        symbol: &str,
        base_amount: Decimal,
        expected_price: Decimal,
    ) -> GridCoreResult<PlaceOrderResult> {
        let wallet_key = Self::wallet_key(wallet_settings);
        self.ensure_seeded(&wallet_key).await;
        let (base_asset, quote_asset) = Self::split_symbol(symbol);
        let proceeds = base_amount * expected_price;

        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers.entry(wallet_key).or_default();
        *ledger.entry(base_asset).or_insert(Decimal::ZERO) -= base_amount;
        *ledger.entry(quote_asset).or_insert(Decimal::ZERO) += proceeds;

        Ok(PlaceOrderResult { order_id: self.next_order_id(), executed_qty: base_amount, avg_price: expected_price })
    }

    async fn symbol_precision(&self, _symbol: &str) -> GridCoreResult<SymbolPrecision> {
        Ok(DEFAULT_PRECISION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buy_then_sell_round_trips_balances() {
        let broker = PaperBroker::new(Exchange::Asterdex);
        broker.seed_balance("default", "USDT", dec!(1000)).await;

        let buy = broker.place_spot_buy(None, "BTCUSDT", "BTC", "USDT", dec!(100), dec!(50000)).await.unwrap();
        assert_eq!(buy.executed_qty, dec!(0.002));

        let balances = broker.fetch_spot_account(None).await.unwrap();
        assert_eq!(balances["USDT"], dec!(900));
        assert_eq!(balances["BTC"], dec!(0.002));

        let sell = broker.place_spot_sell(None, "BTCUSDT", dec!(0.002), dec!(50000)).await.unwrap();
        assert_eq!(sell.avg_price, dec!(50000));

        let balances = broker.fetch_spot_account(None).await.unwrap();
        assert_eq!(balances["USDT"], dec!(1000));
        assert_eq!(balances["BTC"], dec!(0));
    }

    #[tokio::test]
    async fn unseeded_wallet_gets_default_seed() {
        let broker = PaperBroker::new(Exchange::Bingx);
        let balances = broker.fetch_spot_account(None).await.unwrap();
        assert_eq!(balances["USDT"], dec!(10000));
    }

    #[test]
    fn splits_known_stable_quote_suffixes() {
        assert_eq!(PaperBroker::split_symbol("BTCUSDT"), ("BTC".to_string(), "USDT".to_string()));
        assert_eq!(PaperBroker::split_symbol("ETHUSDC"), ("ETH".to_string(), "USDC".to_string()));
    }
}

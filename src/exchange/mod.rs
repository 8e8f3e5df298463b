//! The abstract exchange surface the engine depends on, plus the Aster,
//! BingX, and paper-trading implementations.
//!
//! Mirrors the teacher's `grid::executor::GridExchange` trait: a small
//! `#[async_trait]` contract the engine is generic over, so tests can swap
//! in `exchange::paper::PaperBroker` without touching engine code.

pub mod aster;
pub mod bingx;
pub mod paper;
pub mod precision;
pub mod signing;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::error::{GridCoreError, GridCoreResult};
use crate::model::{Exchange, UserSettings};

pub use precision::{PrecisionCache, SymbolInfoCache, SymbolPrecision};

/// Resolved API credentials for one signed call.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Decrypts API credentials read from `UserSettings.apiConfig`. The
/// symmetric encryption scheme itself is an external collaborator (out of
/// this crate's scope per spec.md §1); this trait is the interface the core
/// consumes. `PlaintextCipher` is the dev-mode fallback described in §6.4
/// when `API_ENCRYPTION_KEY` is unset.
pub trait CredentialCipher: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> GridCoreResult<String>;
}

/// Fallback credentials read from process-wide environment variables, used
/// when a wallet has no `apiConfig` entry for the exchange.
#[derive(Debug, Clone, Default)]
pub struct FallbackCredentials {
    by_exchange: HashMap<Exchange, Credentials>,
}

impl FallbackCredentials {
    pub fn from_env() -> Self {
        let mut by_exchange = HashMap::new();
        if let (Ok(key), Ok(secret)) = (std::env::var("API_KEY_ASTER"), std::env::var("API_KEY_SECRET_ASTER")) {
            by_exchange.insert(Exchange::Asterdex, Credentials { api_key: key, api_secret: secret });
        }
        if let (Ok(key), Ok(secret)) = (std::env::var("API_KEY_BINGX"), std::env::var("API_KEY_SECRET_BINGX")) {
            by_exchange.insert(Exchange::Bingx, Credentials { api_key: key, api_secret: secret });
        }
        Self { by_exchange }
    }

    pub fn get(&self, exchange: Exchange) -> Option<&Credentials> {
        self.by_exchange.get(&exchange)
    }
}

/// Resolve `(apiKey, apiSecret)` for a signed call: user-specific config
/// first, then process-wide fallback. `MissingCredentials` if neither
/// resolves (spec.md §4.3).
pub fn resolve_credentials(
    settings: Option<&UserSettings>,
    exchange: Exchange,
    cipher: &dyn CredentialCipher,
    fallback: &FallbackCredentials,
) -> GridCoreResult<Credentials> {
    if let Some(settings) = settings {
        if let Some(entry) = settings.api_config.get(&exchange) {
            let api_key = cipher.decrypt(&entry.api_key_encrypted)?;
            let api_secret = cipher.decrypt(&entry.api_secret_encrypted)?;
            return Ok(Credentials { api_key, api_secret });
        }
    }
    fallback.get(exchange).cloned().ok_or(GridCoreError::MissingCredentials)
}

/// Outcome of a successfully-submitted market order.
#[derive(Debug, Clone)]
pub struct PlaceOrderResult {
    pub order_id: String,
    pub executed_qty: Decimal,
    pub avg_price: Decimal,
}

impl PlaceOrderResult {
    /// Apply the §4.3 fallback: if the exchange reported a zero fill
    /// quantity or average price, the trade still succeeded — substitute
    /// the engine's submitted amount/expected price so the position row
    /// reflects what was actually intended.
    pub fn reconciled(mut self, submitted_amount: Decimal, expected_price: Decimal) -> Self {
        if self.executed_qty.is_zero() {
            self.executed_qty = submitted_amount;
        }
        if self.avg_price.is_zero() {
            self.avg_price = expected_price;
        }
        self
    }
}

/// One symbol's trading rules as exposed by `exchangeInfo`.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
    pub precision: SymbolPrecision,
}

impl SymbolInfo {
    pub fn is_trading(&self) -> bool {
        self.status.eq_ignore_ascii_case("TRADING")
    }
}

/// `PlaceSpotBuy`'s symbol validation (spec.md §4.3): the symbol must resolve
/// to a `TRADING` entry in `symbols`; otherwise return up to 10 alternates
/// for the same `(baseAsset, quoteAsset)` pair.
pub fn validate_symbol_for_trading(symbols: &[SymbolInfo], symbol: &str, base_asset: &str, quote_asset: &str) -> GridCoreResult<()> {
    let normalized = precision::normalize_symbol(symbol);
    if let Some(info) = symbols.iter().find(|s| precision::normalize_symbol(&s.symbol) == normalized) {
        if info.is_trading() {
            return Ok(());
        }
    }
    let alternates = symbols
        .iter()
        .filter(|s| s.base_asset.eq_ignore_ascii_case(base_asset) && s.quote_asset.eq_ignore_ascii_case(quote_asset) && s.is_trading())
        .take(10)
        .map(|s| s.symbol.clone())
        .collect();
    Err(GridCoreError::InvalidSymbol { symbol: symbol.to_string(), alternates })
}

/// Capability set: FetchExchangeInfo, FetchAllTickerPrices, FetchSpotAccount,
/// PlaceOrder (spec.md §4.3).
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Cached per-symbol precision info; implementations refresh from
    /// `exchangeInfo` on a 5-minute TTL (spec.md §4.3).
    async fn fetch_exchange_info(&self) -> GridCoreResult<Vec<SymbolInfo>>;

    /// Last price for every ticker the exchange quotes.
    async fn fetch_all_ticker_prices(&self) -> GridCoreResult<HashMap<String, Decimal>>;

    /// Spot balances for the given wallet, normalized to `{asset: free}`.
    async fn fetch_spot_account(
        &self,
        wallet_settings: Option<&UserSettings>,
    ) -> GridCoreResult<HashMap<String, Decimal>>;

    /// MARKET BUY using `quoteOrderQty`. `base_asset`/`quote_asset` are the
    /// order's declared pair, used only to build the alternates list if
    /// `symbol` turns out not to be `TRADING` (spec.md §4.3).
    async fn place_spot_buy(
        &self,
        wallet_settings: Option<&UserSettings>,
        symbol: &str,
        base_asset: &str,
        quote_asset: &str,
        quote_amount: Decimal,
        expected_price: Decimal,
    ) -> GridCoreResult<PlaceOrderResult>;

    /// MARKET SELL using rounded `quantity`.
    async fn place_spot_sell(
        &self,
        wallet_settings: Option<&UserSettings>,
        symbol: &str,
        base_amount: Decimal,
        expected_price: Decimal,
    ) -> GridCoreResult<PlaceOrderResult>;

    /// Resolve a symbol's cached precision, validating it is `TRADING` and
    /// returning up to 10 alternates for the pair otherwise (spec.md §4.3).
    async fn symbol_precision(&self, symbol: &str) -> GridCoreResult<SymbolPrecision>;
}

/// `PlaintextCipher` performs no decryption; used when `API_ENCRYPTION_KEY`
/// is absent (dev-only, per spec.md §6.4 — a one-time WARN is the caller's
/// responsibility, not this type's).
pub struct PlaintextCipher;

impl CredentialCipher for PlaintextCipher {
    fn decrypt(&self, ciphertext: &str) -> GridCoreResult<String> {
        Ok(ciphertext.to_string())
    }
}

//! BingX spot adapter.
//!
//! Same signing scheme as Aster (spec.md §6.1) but BingX returns its own
//! field names for balances (`coin`/`currency`, `available`/`freeze`) and
//! often reports symbols with a `-` separator (`ETH-USDT`); both are
//! normalized here so the rest of the core never has to know the
//! difference.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::signing::build_signed_query;
use super::{
    resolve_credentials, validate_symbol_for_trading, CredentialCipher, ExchangeAdapter, FallbackCredentials,
    PlaceOrderResult, PrecisionCache, SymbolInfo, SymbolInfoCache, SymbolPrecision,
};
use crate::decimal::{to_scale, RoundMode};
use crate::error::{GridCoreError, GridCoreResult};
use crate::model::{Exchange, UserSettings};

const SPOT_BASE_URL: &str = "https://open-api.bingx.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const EXCHANGE_MIN_NOTIONAL_USDT: Decimal = Decimal::new(5, 0);

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    data: ExchangeInfoData,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoData {
    symbols: Vec<ExchangeInfoSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoSymbol {
    symbol: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    #[serde(default = "default_trading_status")]
    status: String,
    #[serde(default, rename = "stepSize")]
    step_size: Option<Decimal>,
    #[serde(default, rename = "tickSize")]
    tick_size: Option<Decimal>,
    #[serde(default, rename = "minNotional")]
    min_notional: Option<Decimal>,
    #[serde(default, rename = "quotePrecision")]
    quote_precision: Option<u32>,
    #[serde(default, rename = "basePrecision")]
    base_precision: Option<u32>,
}

fn default_trading_status() -> String {
    "TRADING".to_string()
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    data: Vec<TickerPriceEntry>,
}

#[derive(Debug, Deserialize)]
struct TickerPriceEntry {
    symbol: String,
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct SpotAccountResponse {
    data: SpotAccountData,
}

#[derive(Debug, Deserialize)]
struct SpotAccountData {
    balances: Vec<SpotBalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct SpotBalanceEntry {
    #[serde(alias = "asset", alias = "coin")]
    currency: String,
    #[serde(alias = "free", alias = "available")]
    available: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    data: OrderResponseData,
}

#[derive(Debug, Deserialize)]
struct OrderResponseData {
    #[serde(rename = "orderId")]
    order_id: serde_json::Value,
    #[serde(default, rename = "executedQty")]
    executed_qty: Decimal,
    #[serde(default, rename = "avgPrice")]
    avg_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// BingX exchange-info/ticker/account/order adapter.
pub struct BingxAdapter {
    http: reqwest::Client,
    spot_base_url: String,
    cipher: Arc<dyn CredentialCipher>,
    fallback: FallbackCredentials,
    precision_cache: PrecisionCache,
    symbol_info_cache: SymbolInfoCache,
}

impl BingxAdapter {
    pub fn new(cipher: Arc<dyn CredentialCipher>, fallback: FallbackCredentials) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client builds with a static timeout"),
            spot_base_url: SPOT_BASE_URL.to_string(),
            cipher,
            fallback,
            precision_cache: PrecisionCache::new(),
            symbol_info_cache: SymbolInfoCache::new(),
        }
    }

    /// Cached `exchangeInfo` symbol list for `validate_symbol_for_trading`
    /// (spec.md §4.3's 5-minute TTL).
    async fn cached_symbols(&self) -> GridCoreResult<Vec<SymbolInfo>> {
        if let Some(symbols) = self.symbol_info_cache.get().await {
            return Ok(symbols);
        }
        let symbols = self.fetch_exchange_info().await?;
        self.symbol_info_cache.put(symbols.clone()).await;
        Ok(symbols)
    }

    fn now_ms() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
    }

    async fn credentials(&self, wallet_settings: Option<&UserSettings>) -> GridCoreResult<super::Credentials> {
        resolve_credentials(wallet_settings, Exchange::Bingx, self.cipher.as_ref(), &self.fallback)
    }

    async fn raise_for_status(resp: reqwest::Response) -> GridCoreResult<reqwest::Response> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body: ErrorResponse = resp
                .json()
                .await
                .unwrap_or(ErrorResponse { code: 0, msg: format!("HTTP {status}") });
            Err(GridCoreError::Exchange(format!("bingx: {} (code {})", body.msg, body.code)))
        }
    }

    fn round_sell_quantity(qty: Decimal, precision: SymbolPrecision, expected_price: Decimal) -> Decimal {
        let step = precision.step_size;
        if step.is_zero() {
            return qty;
        }
        let steps = (qty / step).floor();
        let mut rounded = steps * step;
        if rounded * expected_price < EXCHANGE_MIN_NOTIONAL_USDT {
            rounded = (steps + Decimal::ONE) * step;
        }
        rounded.normalize()
    }

    fn round_quote_amount(amount: Decimal, precision: SymbolPrecision) -> Decimal {
        to_scale(amount, precision.quote_precision, RoundMode::Down)
    }
}

#[async_trait]
impl ExchangeAdapter for BingxAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Bingx
    }

    async fn fetch_exchange_info(&self) -> GridCoreResult<Vec<SymbolInfo>> {
        let url = format!("{}/openApi/spot/v1/common/symbols", self.spot_base_url);
        let resp = self.http.get(&url).send().await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: ExchangeInfoResponse = resp.json().await?;

        let symbols = body
            .data
            .symbols
            .into_iter()
            .map(|s| {
                let precision = SymbolPrecision {
                    step_size: s.step_size.unwrap_or_else(|| Decimal::new(1, 8)),
                    tick_size: s.tick_size.unwrap_or_else(|| Decimal::new(1, 2)),
                    quote_precision: s.quote_precision.unwrap_or(2),
                    base_precision: s.base_precision.unwrap_or(8),
                    min_notional: s.min_notional.unwrap_or(EXCHANGE_MIN_NOTIONAL_USDT),
                }
                .with_stable_quote_override(&s.quote_asset);
                SymbolInfo {
                    symbol: super::precision::normalize_symbol(&s.symbol),
                    base_asset: s.base_asset,
                    quote_asset: s.quote_asset,
                    status: s.status,
                    precision,
                }
            })
            .collect::<Vec<_>>();

        for symbol in &symbols {
            self.precision_cache.put(&symbol.symbol, symbol.precision).await;
        }

        Ok(symbols)
    }

    async fn fetch_all_ticker_prices(&self) -> GridCoreResult<HashMap<String, Decimal>> {
        let url = format!("{}/openApi/spot/v1/ticker/price", self.spot_base_url);
        let resp = self.http.get(&url).send().await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: TickerPriceResponse = resp.json().await?;
        Ok(body
            .data
            .into_iter()
            .map(|t| (super::precision::normalize_symbol(&t.symbol), t.price))
            .collect())
    }

    async fn fetch_spot_account(&self, wallet_settings: Option<&UserSettings>) -> GridCoreResult<HashMap<String, Decimal>> {
        let creds = self.credentials(wallet_settings).await?;
        let timestamp = Self::now_ms();
        let query = build_signed_query(vec![], &creds.api_secret, timestamp);
        let url = format!("{}/openApi/spot/v1/account/balance?{}", self.spot_base_url, query);
        let resp = self
            .http
            .get(&url)
            .header("X-BX-APIKEY", &creds.api_key)
            .send()
            .await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: SpotAccountResponse = resp.json().await?;
        Ok(body.data.balances.into_iter().map(|b| (b.currency, b.available)).collect())
    }

    async fn place_spot_buy(
        &self,
        wallet_settings: Option<&UserSettings>,
        symbol: &str,
        base_asset: &str,
        quote_asset: &str,
        quote_amount: Decimal,
        expected_price: Decimal,
    ) -> GridCoreResult<PlaceOrderResult> {
        let symbols = self.cached_symbols().await?;
        validate_symbol_for_trading(&symbols, symbol, base_asset, quote_asset)?;
        let precision = self.symbol_precision(symbol).await?;
        let creds = self.credentials(wallet_settings).await?;
        let rounded_quote = Self::round_quote_amount(quote_amount, precision);

        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), "BUY".to_string()),
            ("type".to_string(), "MARKET".to_string()),
            ("quoteOrderQty".to_string(), rounded_quote.to_string()),
        ];
        let timestamp = Self::now_ms();
        let query = build_signed_query(params, &creds.api_secret, timestamp);
        let url = format!("{}/openApi/spot/v1/trade/order?{}", self.spot_base_url, query);
        let resp = self
            .http
            .post(&url)
            .header("X-BX-APIKEY", &creds.api_key)
            .send()
            .await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: OrderResponse = resp.json().await?;
        Ok(PlaceOrderResult {
            order_id: body.data.order_id.to_string(),
            executed_qty: body.data.executed_qty,
            avg_price: body.data.avg_price,
        }
        .reconciled(rounded_quote / expected_price, expected_price))
    }

    async fn place_spot_sell(
        &self,
        wallet_settings: Option<&UserSettings>,
        symbol: &str,
        base_amount: Decimal,
        expected_price: Decimal,
    ) -> GridCoreResult<PlaceOrderResult> {
        let precision = self.symbol_precision(symbol).await?;
        let creds = self.credentials(wallet_settings).await?;
        let rounded_qty = Self::round_sell_quantity(base_amount, precision, expected_price);

        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), "SELL".to_string()),
            ("type".to_string(), "MARKET".to_string()),
            ("quantity".to_string(), rounded_qty.to_string()),
        ];
        let timestamp = Self::now_ms();
        let query = build_signed_query(params, &creds.api_secret, timestamp);
        let url = format!("{}/openApi/spot/v1/trade/order?{}", self.spot_base_url, query);
        let resp = self
            .http
            .post(&url)
            .header("X-BX-APIKEY", &creds.api_key)
            .send()
            .await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: OrderResponse = resp.json().await?;
        Ok(PlaceOrderResult {
            order_id: body.data.order_id.to_string(),
            executed_qty: body.data.executed_qty,
            avg_price: body.data.avg_price,
        }
        .reconciled(rounded_qty, expected_price))
    }

    async fn symbol_precision(&self, symbol: &str) -> GridCoreResult<SymbolPrecision> {
        if let Some(p) = self.precision_cache.get(symbol).await {
            return Ok(p);
        }
        let symbols = self.fetch_exchange_info().await?;
        symbols
            .into_iter()
            .find(|s| super::precision::normalize_symbol(&s.symbol) == super::precision::normalize_symbol(symbol))
            .map(|s| s.precision)
            .ok_or_else(|| GridCoreError::Validation(format!("unknown symbol {symbol}")))
    }
}

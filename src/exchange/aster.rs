//! Aster spot adapter — `https://sapi.asterdex.com` (spec.md §6.1).

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

const SPOT_BASE_URL: &str = "https://sapi.asterdex.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const EXCHANGE_MIN_NOTIONAL_USDT: Decimal = Decimal::new(5, 0);

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<ExchangeInfoSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoSymbol {
    symbol: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    status: String,
    filters: Vec<ExchangeInfoFilter>,
    #[serde(rename = "quotePrecision")]
    quote_precision: u32,
    #[serde(rename = "basePrecision")]
    base_precision: u32,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoFilter {
    #[serde(rename = "filterType")]
    filter_type: String,
    #[serde(default)]
    #[serde(rename = "stepSize")]
    step_size: Option<Decimal>,
    #[serde(default)]
    #[serde(rename = "tickSize")]
    tick_size: Option<Decimal>,
    #[serde(default)]
    #[serde(rename = "minNotional")]
    min_notional: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    symbol: String,
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct SpotAccountResponse {
    balances: Vec<SpotBalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct SpotBalanceEntry {
    asset: String,
    free: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
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

/// Aster exchange-info/ticker/account/order adapter.
pub struct AsterAdapter {
    http: reqwest::Client,
    spot_base_url: String,
    cipher: Arc<dyn CredentialCipher>,
    fallback: FallbackCredentials,
    precision_cache: PrecisionCache,
    symbol_info_cache: SymbolInfoCache,
}

impl AsterAdapter {
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
        resolve_credentials(wallet_settings, Exchange::Asterdex, self.cipher.as_ref(), &self.fallback)
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
            Err(GridCoreError::Exchange(format!("aster: {} (code {})", body.msg, body.code)))
        }
    }

    /// Round a SELL quantity down to `step_size`, bumping one step if the
    /// resulting notional would fall under the exchange-enforced 5 USDT
    /// minimum (spec.md §4.3).
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
impl ExchangeAdapter for AsterAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Asterdex
    }

    async fn fetch_exchange_info(&self) -> GridCoreResult<Vec<SymbolInfo>> {
        let url = format!("{}/api/v1/exchangeInfo", self.spot_base_url);
        let resp = self.http.get(&url).send().await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: ExchangeInfoResponse = resp.json().await?;

        let symbols = body
            .symbols
            .into_iter()
            .map(|s| {
                let step_size = s
                    .filters
                    .iter()
                    .find(|f| f.filter_type == "LOT_SIZE")
                    .and_then(|f| f.step_size)
                    .unwrap_or(Decimal::new(1, 8));
                let tick_size = s
                    .filters
                    .iter()
                    .find(|f| f.filter_type == "PRICE_FILTER")
                    .and_then(|f| f.tick_size)
                    .unwrap_or(Decimal::new(1, 2));
                let min_notional = s
                    .filters
                    .iter()
                    .find(|f| f.filter_type == "MIN_NOTIONAL")
                    .and_then(|f| f.min_notional)
                    .unwrap_or(EXCHANGE_MIN_NOTIONAL_USDT);
                let precision = SymbolPrecision {
                    step_size,
                    tick_size,
                    quote_precision: s.quote_precision,
                    base_precision: s.base_precision,
                    min_notional,
                }
                .with_stable_quote_override(&s.quote_asset);
                SymbolInfo {
                    symbol: s.symbol,
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
        let url = format!("{}/api/v1/ticker/price", self.spot_base_url);
        let resp = self.http.get(&url).send().await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: Vec<TickerPriceResponse> = resp.json().await?;
        Ok(body.into_iter().map(|t| (t.symbol, t.price)).collect())
    }

    async fn fetch_spot_account(&self, wallet_settings: Option<&UserSettings>) -> GridCoreResult<HashMap<String, Decimal>> {
        let creds = self.credentials(wallet_settings).await?;
        let timestamp = Self::now_ms();
        let query = build_signed_query(vec![], &creds.api_secret, timestamp);
        let url = format!("{}/api/v1/account?{}", self.spot_base_url, query);
        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .send()
            .await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: SpotAccountResponse = resp.json().await?;
        Ok(body.balances.into_iter().map(|b| (b.asset, b.free)).collect())
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
        let url = format!("{}/api/v1/order", self.spot_base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(query)
            .send()
            .await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: OrderResponse = resp.json().await?;
        Ok(PlaceOrderResult {
            order_id: body.order_id.to_string(),
            executed_qty: body.executed_qty,
            avg_price: body.avg_price,
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
        let url = format!("{}/api/v1/order", self.spot_base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(query)
            .send()
            .await?;
        let resp = Self::raise_for_status(resp).await?;
        let body: OrderResponse = resp.json().await?;
        Ok(PlaceOrderResult {
            order_id: body.order_id.to_string(),
            executed_qty: body.executed_qty,
            avg_price: body.avg_price,
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

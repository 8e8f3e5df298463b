//! `OrderSpec` and the nested configuration rows that parameterize one
//! user-defined grid order.
//!
//! The source passed these around as untyped option bags threaded through
//! string-keyed maps. Every field here is a named, typed member instead:
//! unknown JSON fields are rejected by serde's default (non-`deny_unknown_fields`
//! behavior would silently ignore them, which is what we want for forward
//! compatibility with the HTTP control plane's schema — but every field this
//! crate reads is named and typed, never pulled out of a generic map at the
//! point of use).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exchange identifier. May differ between a user's default exchange and an
/// individual order's fixed-at-creation exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Asterdex,
    Bingx,
}

impl Default for Exchange {
    fn default() -> Self {
        Exchange::Asterdex
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exchange::Asterdex => write!(f, "asterdex"),
            Exchange::Bingx => write!(f, "bingx"),
        }
    }
}

/// Wallet-policy mode governing how much of a side's budget a new entry may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BudgetMode {
    /// Only re-invest proceeds already realized on the opposite side.
    OnlySold,
    /// Cap cumulative value on this side at a fixed maximum.
    MaxDefined,
    /// No extra cap beyond the wallet balance itself.
    WalletLimit,
}

/// Per-side (buy or sell) budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideConfig {
    pub currency: String,
    #[serde(default)]
    pub wallet_protection: Decimal,
    pub mode: BudgetMode,
    #[serde(default)]
    pub max_value: Decimal,
    #[serde(default)]
    pub add_profit: bool,
}

/// Gate configuration for a side's entry condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideConditions {
    /// Base per-1%-of-trend transaction value (default 200 when absent).
    #[serde(default = "default_min_value_per_1_percent")]
    pub min_value_per_1_percent: Decimal,
    /// Price beyond which entries are blocked, unless already profitable and
    /// `check_threshold_if_profitable` is false. `0` disables the rule.
    #[serde(default)]
    pub price_threshold: Decimal,
    #[serde(default = "default_true")]
    pub check_threshold_if_profitable: bool,
}

fn default_min_value_per_1_percent() -> Decimal {
    Decimal::from(200)
}

fn default_true() -> bool {
    true
}

/// One row of `trendPercents`, selected by "greatest trend <= given trend".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPercentRow {
    pub trend: i32,
    #[serde(default)]
    pub buy_percent: Option<Decimal>,
    #[serde(default)]
    pub sell_percent: Option<Decimal>,
}

/// Legacy single-point condition, honored only when a row carries neither
/// `min_price` nor `max_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LegacyCondition {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

/// A price-range row used by `additional*Values`, `max*PerTransaction`, and
/// `*SwingPercent`. Supports both the modern range shape and the legacy
/// point-condition shape; the range shape takes precedence when both
/// `min_price`/`max_price` are present (see `model::range::matches`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeRow {
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub condition: Option<LegacyCondition>,
    pub value: Decimal,
}

/// Platform-wide toggles for a single order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    #[serde(default)]
    pub check_fee_profit: bool,
}

/// One user-defined grid order. 1 `OrderSpec` maps to 0..1 `GridState` and
/// N `Position` rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub exchange: Exchange,
    pub base_asset: String,
    pub quote_asset: String,
    pub refresh_interval: u64,
    pub min_profit_percent: Decimal,
    pub focus_price: Decimal,
    #[serde(default)]
    pub time_to_new_focus: u64,
    pub buy: SideConfig,
    pub sell: SideConfig,
    pub buy_conditions: SideConditions,
    pub sell_conditions: SideConditions,
    #[serde(default)]
    pub trend_percents: Vec<TrendPercentRow>,
    #[serde(default)]
    pub additional_buy_values: Vec<RangeRow>,
    #[serde(default)]
    pub additional_sell_values: Vec<RangeRow>,
    #[serde(default)]
    pub max_buy_per_transaction: Vec<RangeRow>,
    #[serde(default)]
    pub max_sell_per_transaction: Vec<RangeRow>,
    #[serde(default)]
    pub buy_swing_percent: Vec<RangeRow>,
    #[serde(default)]
    pub sell_swing_percent: Vec<RangeRow>,
    #[serde(default)]
    pub platform: PlatformConfig,
}

impl OrderSpec {
    /// Symbol as the exchange sees it: concatenation of base and quote.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base_asset, self.quote_asset)
    }

    /// `maxTrend(spec)`: the highest `trend` value named in `trendPercents`,
    /// or 0 when the list is empty.
    pub fn max_trend(&self) -> i32 {
        self.trend_percents.iter().map(|r| r.trend).max().unwrap_or(0)
    }
}

//! Focus-price target computations (spec.md §4.6.1).

use rust_decimal::Decimal;

use crate::decimal::{to_scale, RoundMode, PRICE_SCALE};
use crate::model::OrderSpec;

const DEFAULT_TREND_PERCENT: Decimal = Decimal::new(5, 1);

/// The step percent for `trend` on the given side: the row in
/// `trend_percents` with the greatest `trend <= given trend`, falling back
/// to `spec.min_profit_percent`, then `0.5`.
pub fn trend_percent(trend: i32, is_buy: bool, spec: &OrderSpec) -> Decimal {
    let row = spec
        .trend_percents
        .iter()
        .filter(|r| r.trend <= trend)
        .max_by_key(|r| r.trend);

    let from_row = row.and_then(|r| if is_buy { r.buy_percent } else { r.sell_percent });

    from_row.unwrap_or_else(|| {
        if spec.min_profit_percent.is_zero() {
            DEFAULT_TREND_PERCENT
        } else {
            spec.min_profit_percent
        }
    })
}

/// `focus − focus × trendPercent / 100`, rounded DOWN to `PRICE_SCALE`.
pub fn next_buy_target(focus: Decimal, trend: i32, spec: &OrderSpec) -> Decimal {
    let pct = trend_percent(trend, true, spec);
    let raw = focus - focus * pct / Decimal::from(100);
    to_scale(raw, PRICE_SCALE, RoundMode::Down)
}

/// `focus + focus × trendPercent / 100`, rounded UP to `PRICE_SCALE`.
pub fn next_sell_target(focus: Decimal, trend: i32, spec: &OrderSpec) -> Decimal {
    let pct = trend_percent(trend, false, spec);
    let raw = focus + focus * pct / Decimal::from(100);
    to_scale(raw, PRICE_SCALE, RoundMode::Up)
}

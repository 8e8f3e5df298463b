//! Range matching and transaction-value sizing (spec.md §4.6.2, §4.6.4).

use rust_decimal::Decimal;

use crate::decimal::{to_scale, RoundMode, PRICE_SCALE};
use crate::model::{LegacyCondition, OrderSpec, RangeRow};

use super::targets::trend_percent;

/// Does `row` match `price`? Modern range shape (`min_price`/`max_price`)
/// takes precedence; the legacy point-condition shape is honored only when
/// neither bound is set.
pub fn row_matches(row: &RangeRow, price: Decimal) -> bool {
    if row.min_price.is_some() || row.max_price.is_some() {
        let above_min = row.min_price.map(|m| price >= m).unwrap_or(true);
        let below_max = row.max_price.map(|m| price < m).unwrap_or(true);
        return above_min && below_max;
    }
    match (row.price, row.condition) {
        (Some(p), Some(LegacyCondition::Less)) => price < p,
        (Some(p), Some(LegacyCondition::LessEqual)) => price <= p,
        (Some(p), Some(LegacyCondition::Greater)) => price > p,
        (Some(p), Some(LegacyCondition::GreaterEqual)) => price >= p,
        _ => false,
    }
}

/// First matching row in `rows` for `price`, in insertion order.
pub fn first_match(rows: &[RangeRow], price: Decimal) -> Option<&RangeRow> {
    rows.iter().find(|r| row_matches(r, price))
}

/// `calculateTransactionValue`: base-per-trend plus any additional-value
/// row, capped by any max-per-transaction row, rounded DOWN to `PRICE_SCALE`.
pub fn transaction_value(
    price: Decimal,
    trend: i32,
    is_buy: bool,
    effective_trend_percent: Option<Decimal>,
    spec: &OrderSpec,
) -> Decimal {
    let trend_pct = effective_trend_percent.unwrap_or_else(|| trend_percent(trend, is_buy, spec));

    let min_value_per_1_percent =
        if is_buy { spec.buy_conditions.min_value_per_1_percent } else { spec.sell_conditions.min_value_per_1_percent };
    let mut base = min_value_per_1_percent * trend_pct;

    let additional_rows = if is_buy { &spec.additional_buy_values } else { &spec.additional_sell_values };
    if let Some(row) = first_match(additional_rows, price) {
        base += row.value * trend_pct;
    }

    let max_rows = if is_buy { &spec.max_buy_per_transaction } else { &spec.max_sell_per_transaction };
    if let Some(row) = first_match(max_rows, price) {
        if base > row.value {
            base = row.value;
        }
    }

    to_scale(base, PRICE_SCALE, RoundMode::Down)
}

//! Entry/close gates (spec.md §4.6.3).

use rust_decimal::Decimal;

use crate::model::{GridState, OrderSpec};

use super::sizing::first_match;

/// Price-threshold rule shared by BUY, SELL-short, and long-close: blocks
/// when `threshold` is set and the directional test against `price` holds,
/// unless the grid is already net-profitable and
/// `check_threshold_if_profitable` is false.
fn threshold_blocks(price: Decimal, threshold: Decimal, beyond: bool, check_if_profitable: bool, total_profit: Decimal) -> bool {
    if threshold.is_zero() {
        return false;
    }
    let breached = if beyond { price > threshold } else { price < threshold };
    if !breached {
        return false;
    }
    if !check_if_profitable && total_profit > Decimal::ZERO {
        return false;
    }
    true
}

/// `|focus − price| / focus × 100 ≥ swingPercent(price)`; a row with
/// `value = 0` or no matching row passes trivially.
fn swing_gate_passes(focus: Decimal, price: Decimal, rows: &[crate::model::RangeRow]) -> bool {
    let Some(row) = first_match(rows, price) else { return true };
    if row.value.is_zero() {
        return true;
    }
    if focus.is_zero() {
        return true;
    }
    let move_pct = (focus - price).abs() / focus * Decimal::from(100);
    move_pct >= row.value
}

/// `ShouldBuy`: price-threshold, target, and swing gates must all pass.
pub fn should_buy(price: Decimal, state: &GridState, spec: &OrderSpec) -> bool {
    if threshold_blocks(
        price,
        spec.buy_conditions.price_threshold,
        true,
        spec.buy_conditions.check_threshold_if_profitable,
        state.total_profit,
    ) {
        return false;
    }
    if price > state.next_buy_target {
        return false;
    }
    swing_gate_passes(state.current_focus_price, price, &spec.buy_swing_percent)
}

/// `ShouldSellShort`: mirror of `should_buy` on the sell side.
pub fn should_sell_short(price: Decimal, state: &GridState, spec: &OrderSpec) -> bool {
    if threshold_blocks(
        price,
        spec.sell_conditions.price_threshold,
        false,
        spec.sell_conditions.check_threshold_if_profitable,
        state.total_profit,
    ) {
        return false;
    }
    if price < state.next_sell_target {
        return false;
    }
    swing_gate_passes(state.current_focus_price, price, &spec.sell_swing_percent)
}

/// Long-close threshold: blocks all closes in the sweep (applied once, not
/// per position) when `sellConditions.priceThreshold > 0` and `price` has
/// fallen below it.
pub fn long_close_threshold_blocks(price: Decimal, state: &GridState, spec: &OrderSpec) -> bool {
    threshold_blocks(
        price,
        spec.sell_conditions.price_threshold,
        false,
        spec.sell_conditions.check_threshold_if_profitable,
        state.total_profit,
    )
}

/// Short-close swing gate: evaluated against `buySwingPercent`, referenced
/// to `currentFocusPrice` (or the short's own entry price if focus is 0).
pub fn short_close_swing_passes(focus: Decimal, entry_price: Decimal, price: Decimal, spec: &OrderSpec) -> bool {
    let reference = if focus.is_zero() { entry_price } else { focus };
    swing_gate_passes(reference, price, &spec.buy_swing_percent)
}

//! Execution sub-steps: ExecuteBuy, ExecuteBuySell, ExecuteSellShort,
//! ExecuteSellBuyback (spec.md §4.6.5-4.6.7).

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::audit::{CalcTraceRecord, CalcTraceSink};
use crate::decimal::{to_scale, RoundMode, PRICE_SCALE};
use crate::error::{GridCoreError, GridCoreResult};
use crate::exchange::ExchangeAdapter;
use crate::model::{BudgetMode, GridState, OrderSpec, Position, UserSettings, WalletAddress};
use crate::store::Store;
use crate::wallet_view::WalletView;

use super::gates::short_close_swing_passes;
use super::sizing::transaction_value;
use super::targets::{next_buy_target, next_sell_target, trend_percent};

/// Exchange-enforced minimum transaction value (spec.md §4.6.5, §9 Open
/// Questions: the live source hard-codes 4 USDT regardless of user settings).
const MIN_TRANSACTION_VALUE: Decimal = Decimal::new(4, 0);

/// Buy-side/long-close/short fee factor. Spec.md §9 Open Questions: the fee
/// model reads `0.1% × value / 100`, i.e. 0.001% of the sum — almost
/// certainly an off-by-100 bug in the source, but behavior is specified as
/// written and honored here verbatim. This constant already folds in that
/// `/100`, so call sites must not divide by 100 again.
const FEE_FACTOR: Decimal = Decimal::new(1, 5);

fn fee_check_factor() -> Decimal {
    // `platform.checkFeeProfit` compares `2 × 0.1% × txValue` against
    // expectedProfit — a distinct, intentional 0.1% (not the §9 bug), since
    // that pre-trade guard is meant to be conservative.
    Decimal::new(1, 3)
}

pub struct ExecuteContext<'a> {
    pub store: &'a Arc<dyn Store>,
    pub adapter: &'a Arc<dyn ExchangeAdapter>,
    pub wallet_view: &'a Arc<WalletView>,
    pub audit: &'a Arc<dyn CalcTraceSink>,
    pub wallet: &'a WalletAddress,
    pub wallet_settings: Option<&'a UserSettings>,
    pub spec: &'a OrderSpec,
}

/// `canExecuteBuy`: wallet-policy check for the BUY side.
fn can_execute_buy(tx_value: Decimal, available: Decimal, spec: &OrderSpec, state: &GridState) -> GridCoreResult<()> {
    let avail = available - spec.buy.wallet_protection;
    if avail < tx_value {
        return Err(GridCoreError::InsufficientBalance { required: tx_value, available: avail });
    }
    match spec.buy.mode {
        BudgetMode::OnlySold => {
            let mut allowed = state.total_sold_value - state.total_bought_value;
            if spec.buy.add_profit {
                allowed += state.total_profit;
            }
            if tx_value > allowed {
                return Err(GridCoreError::PolicyDenied("onlySold budget exhausted".to_string()));
            }
        }
        BudgetMode::MaxDefined => {
            let mut eff_max = spec.buy.max_value;
            if spec.buy.add_profit {
                eff_max += state.total_profit;
            }
            if state.total_bought_value + tx_value > eff_max {
                return Err(GridCoreError::PolicyDenied("maxDefined budget exhausted".to_string()));
            }
        }
        BudgetMode::WalletLimit => {}
    }
    Ok(())
}

/// `canExecuteSell` (short side): mirror of `can_execute_buy`, with the
/// "available" figure drawn from the base-asset balance by the caller.
fn can_execute_sell(tx_base_amount: Decimal, available_base: Decimal, spec: &OrderSpec) -> GridCoreResult<Decimal> {
    let avail = available_base - spec.sell.wallet_protection;
    if avail <= Decimal::ZERO {
        return Err(GridCoreError::InsufficientBalance { required: tx_base_amount, available: avail.max(Decimal::ZERO) });
    }
    Ok(tx_base_amount.min(avail))
}

/// ExecuteBuy (spec.md §4.6.5). Returns the updated state on success.
pub async fn execute_buy(ctx: &ExecuteContext<'_>, price: Decimal, mut state: GridState) -> GridCoreResult<GridState> {
    let trend = state.buy_trend_counter;
    let configured_pct = trend_percent(trend, true, ctx.spec);
    let focus = state.current_focus_price;
    let drop_pct = if focus.is_zero() { Decimal::ZERO } else { to_scale((focus - price) / focus * Decimal::from(100), 1, RoundMode::Down) };
    let effective_pct = configured_pct.max(drop_pct);

    let tx_value = transaction_value(price, trend, true, Some(effective_pct), ctx.spec);
    if tx_value < MIN_TRANSACTION_VALUE {
        ctx.audit.record(CalcTraceRecord {
            order_id: ctx.spec.id,
            step: "execute_buy",
            price,
            decision: "skip".to_string(),
            detail: format!("tx_value {tx_value} under {MIN_TRANSACTION_VALUE} USDT floor"),
        });
        return Err(GridCoreError::PolicyDenied("transaction value under exchange minimum".to_string()));
    }

    let available = ctx.wallet_view.get_balance(ctx.wallet.as_str(), ctx.spec.exchange, &ctx.spec.buy.currency).await;
    can_execute_buy(tx_value, available, ctx.spec, &state)?;

    let amount = to_scale(tx_value / price, crate::decimal::AMOUNT_SCALE, RoundMode::Down);
    let target_sell_price = to_scale(price * (Decimal::ONE + ctx.spec.min_profit_percent / Decimal::from(100)), PRICE_SCALE, RoundMode::Up);
    let expected_profit = (target_sell_price - price) * amount;
    if ctx.spec.platform.check_fee_profit {
        let fee_guard = Decimal::from(2) * fee_check_factor() * tx_value;
        if fee_guard >= expected_profit {
            return Err(GridCoreError::PolicyDenied("fee would consume expected profit".to_string()));
        }
    }

    let result = ctx
        .adapter
        .place_spot_buy(ctx.wallet_settings, &ctx.spec.symbol(), &ctx.spec.base_asset, &ctx.spec.quote_asset, tx_value, price)
        .await?;
    let now = Utc::now();

    let position = Position::open_buy(ctx.wallet.clone(), ctx.spec.id, result.avg_price, result.executed_qty, tx_value, trend, target_sell_price, now);
    state.open_position_ids.insert(position.id);

    let next_trend = if trend + 1 >= ctx.spec.max_trend() { 0 } else { trend + 1 };
    state.buy_trend_counter = next_trend;
    state.total_buy_transactions += 1;
    state.total_bought_value += tx_value;
    state.current_focus_price = result.avg_price;
    state.focus_last_updated = now;
    state.next_buy_target = next_buy_target(result.avg_price, next_trend, ctx.spec);
    state.last_updated = now;

    ctx.store.record_open_position(&position, &state).await?;
    ctx.audit.record(CalcTraceRecord {
        order_id: ctx.spec.id,
        step: "execute_buy",
        price,
        decision: "filled".to_string(),
        detail: format!("amount={amount} tx_value={tx_value} trend={trend}->{next_trend}"),
    });
    Ok(state)
}

/// ExecuteBuySell (spec.md §4.6.6): close one OPEN long at a profit.
pub async fn execute_buy_sell(ctx: &ExecuteContext<'_>, price: Decimal, mut position: Position, mut state: GridState) -> GridCoreResult<GridState> {
    let sell_value = position.amount * price;
    let profit_preview = sell_value - position.entry_value;
    if profit_preview < Decimal::ZERO {
        return Err(GridCoreError::PolicyDenied("would close a long at a loss".to_string()));
    }

    let result = ctx.adapter.place_spot_sell(ctx.wallet_settings, &ctx.spec.symbol(), position.amount, price).await?;
    let executed_sell_value = result.avg_price * result.executed_qty;
    let gross_profit = executed_sell_value - position.entry_value;
    let fee = (position.entry_value + executed_sell_value) * FEE_FACTOR;
    let net_profit = gross_profit - fee;

    let now = Utc::now();
    position.close(result.avg_price, executed_sell_value, net_profit, now);
    state.open_position_ids.remove(&position.id);
    state.buy_trend_counter = (state.buy_trend_counter - 1).max(0);
    state.total_sell_transactions += 1;
    state.total_sold_value += executed_sell_value;
    state.total_profit = ctx.store.total_closed_profit(ctx.wallet, ctx.spec.id).await?;
    state.current_focus_price = result.avg_price;
    state.next_buy_target = next_buy_target(result.avg_price, state.buy_trend_counter, ctx.spec);
    state.last_updated = now;

    ctx.store.record_closed_position(&position, &state).await?;
    ctx.audit.record(CalcTraceRecord {
        order_id: ctx.spec.id,
        step: "execute_buy_sell",
        price,
        decision: "closed".to_string(),
        detail: format!("position={} net_profit={net_profit}", position.id),
    });
    Ok(state)
}

/// ExecuteSellShort (spec.md §4.6.7): symmetric to ExecuteBuy.
pub async fn execute_sell_short(ctx: &ExecuteContext<'_>, price: Decimal, mut state: GridState) -> GridCoreResult<GridState> {
    let trend = state.sell_trend_counter;
    let configured_pct = trend_percent(trend, false, ctx.spec);
    let focus = state.current_focus_price;
    let rise_pct = if focus.is_zero() { Decimal::ZERO } else { to_scale((price - focus) / focus * Decimal::from(100), 1, RoundMode::Down) };
    let effective_pct = configured_pct.max(rise_pct);

    let tx_value = transaction_value(price, trend, false, Some(effective_pct), ctx.spec);
    if tx_value < MIN_TRANSACTION_VALUE {
        return Err(GridCoreError::PolicyDenied("transaction value under exchange minimum".to_string()));
    }
    let tx_amount = to_scale(tx_value / price, crate::decimal::AMOUNT_SCALE, RoundMode::Down);

    let available_base = ctx.wallet_view.get_balance(ctx.wallet.as_str(), ctx.spec.exchange, &ctx.spec.base_asset).await;
    let capped_amount = can_execute_sell(tx_amount, available_base, ctx.spec)?;
    if capped_amount.is_zero() {
        return Err(GridCoreError::PolicyDenied("no base balance available to short".to_string()));
    }

    let result = ctx.adapter.place_spot_sell(ctx.wallet_settings, &ctx.spec.symbol(), capped_amount, price).await?;
    let now = Utc::now();
    let sell_value = result.avg_price * result.executed_qty;
    let target_buyback_price = to_scale(price * (Decimal::ONE - ctx.spec.min_profit_percent / Decimal::from(100)), PRICE_SCALE, RoundMode::Down);

    let position = Position::open_sell(ctx.wallet.clone(), ctx.spec.id, result.avg_price, result.executed_qty, sell_value, trend, target_buyback_price, now);
    state.open_sell_position_ids.insert(position.id);

    let next_trend = if trend + 1 >= ctx.spec.max_trend() { 0 } else { trend + 1 };
    state.sell_trend_counter = next_trend;
    state.total_sell_transactions += 1;
    state.total_sold_value += sell_value;
    state.current_focus_price = result.avg_price;
    state.focus_last_updated = now;
    state.next_sell_target = next_sell_target(result.avg_price, next_trend, ctx.spec);
    state.last_updated = now;

    ctx.store.record_open_position(&position, &state).await?;
    ctx.audit.record(CalcTraceRecord {
        order_id: ctx.spec.id,
        step: "execute_sell_short",
        price,
        decision: "filled".to_string(),
        detail: format!("amount={} tx_value={tx_value} trend={trend}->{next_trend}", result.executed_qty),
    });
    Ok(state)
}

/// ExecuteSellBuyback (spec.md §4.6.7): close one OPEN short at a profit.
pub async fn execute_sell_buyback(ctx: &ExecuteContext<'_>, price: Decimal, mut position: Position, mut state: GridState) -> GridCoreResult<GridState> {
    if !short_close_swing_passes(state.current_focus_price, position.entry_price, price, ctx.spec) {
        return Err(GridCoreError::PolicyDenied("short close swing gate not satisfied".to_string()));
    }

    let result = ctx
        .adapter
        .place_spot_buy(ctx.wallet_settings, &ctx.spec.symbol(), &ctx.spec.base_asset, &ctx.spec.quote_asset, position.amount * price, price)
        .await?;
    let executed_buyback_value = result.avg_price * result.executed_qty;
    let gross_profit = position.entry_value - executed_buyback_value;
    let fee = (position.entry_value + executed_buyback_value) * FEE_FACTOR;
    let net_profit = gross_profit - fee;

    let now = Utc::now();
    position.close(result.avg_price, executed_buyback_value, net_profit, now);
    state.open_sell_position_ids.remove(&position.id);
    state.sell_trend_counter = (state.sell_trend_counter - 1).max(0);
    state.total_buy_transactions += 1;
    state.total_bought_value += executed_buyback_value;
    state.total_profit = ctx.store.total_closed_profit(ctx.wallet, ctx.spec.id).await?;
    state.current_focus_price = result.avg_price;
    state.next_sell_target = next_sell_target(result.avg_price, state.sell_trend_counter, ctx.spec);
    state.last_updated = now;

    ctx.store.record_closed_position(&position, &state).await?;
    ctx.audit.record(CalcTraceRecord {
        order_id: ctx.spec.id,
        step: "execute_sell_buyback",
        price,
        decision: "closed".to_string(),
        detail: format!("position={} net_profit={net_profit}", position.id),
    });
    Ok(state)
}

//! `GridEngine` — the per-order decision step (spec.md §4.6).
//!
//! Sub-steps live in their own modules (`targets`, `sizing`, `gates`,
//! `execute`); this module wires them into the seven-step `process_price`
//! sequence and owns the reconciler (I1) and the lifecycle operations
//! (`initialize_grid_state`, `start_grid`/`stop_grid`).

pub mod execute;
pub mod gates;
pub mod sizing;
pub mod targets;

pub use execute::ExecuteContext;
pub use gates::{long_close_threshold_blocks, should_buy, should_sell_short};
pub use sizing::{first_match, row_matches, transaction_value};
pub use targets::{next_buy_target, next_sell_target, trend_percent};

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{CalcTraceSink, NoOpCalcTraceSink};
use crate::error::{GridCoreError, GridCoreResult};
use crate::exchange::ExchangeAdapter;
use crate::model::{GridState, OrderSpec, PositionStatus, PositionType, UserSettings, WalletAddress};
use crate::store::Store;
use crate::wallet_view::WalletView;

/// Long-close and short-close sweeps never act on more than this many
/// positions in a single decision step (spec.md §4.6, step 4).
const MAX_CLOSES_PER_STEP: usize = 10;

/// The grid decision engine. Stateless beyond its `Store`/`WalletView`
/// handles and audit sink — every other input (price, spec, adapter)
/// arrives per call, since a single engine instance serves every order
/// across every wallet.
pub struct GridEngine {
    store: Arc<dyn Store>,
    wallet_view: Arc<WalletView>,
    audit: Arc<dyn CalcTraceSink>,
}

impl GridEngine {
    pub fn new(store: Arc<dyn Store>, wallet_view: Arc<WalletView>) -> Self {
        Self { store, wallet_view, audit: Arc::new(NoOpCalcTraceSink) }
    }

    pub fn with_audit(store: Arc<dyn Store>, wallet_view: Arc<WalletView>, audit: Arc<dyn CalcTraceSink>) -> Self {
        Self { store, wallet_view, audit }
    }

    /// `InitializeGridState`: create and persist the initial `GridState` for
    /// a freshly-created order, with both targets computed for trend 0.
    pub async fn initialize_grid_state(&self, wallet: &WalletAddress, spec: &OrderSpec) -> GridCoreResult<GridState> {
        let now = Utc::now();
        let next_buy = next_buy_target(spec.focus_price, 0, spec);
        let next_sell = next_sell_target(spec.focus_price, 0, spec);
        let state = GridState::new(wallet.clone(), spec.id, spec.focus_price, next_buy, next_sell, now);
        self.store.save_grid_state(&state).await?;
        Ok(state)
    }

    pub async fn start_grid(&self, wallet: &WalletAddress, order_id: Uuid) -> GridCoreResult<()> {
        self.set_active(wallet, order_id, true).await
    }

    pub async fn stop_grid(&self, wallet: &WalletAddress, order_id: Uuid) -> GridCoreResult<()> {
        self.set_active(wallet, order_id, false).await
    }

    async fn set_active(&self, wallet: &WalletAddress, order_id: Uuid, is_active: bool) -> GridCoreResult<()> {
        let Some(mut state) = self.store.find_grid_state(wallet, order_id).await? else {
            return Err(GridCoreError::Validation(format!("no grid state for order {order_id}")));
        };
        state.is_active = is_active;
        state.last_updated = Utc::now();
        self.store.save_grid_state(&state).await
    }

    /// I1: re-sync `open_position_ids`/`open_sell_position_ids` from the
    /// positions table, persisting if they disagree.
    async fn reconcile(&self, wallet: &WalletAddress, mut state: GridState) -> GridCoreResult<GridState> {
        let open = self
            .store
            .find_positions_by_wallet_and_order(wallet, state.order_id, Some(PositionStatus::Open))
            .await?;
        let actual_buys: BTreeSet<Uuid> =
            open.iter().filter(|p| p.position_type == PositionType::Buy).map(|p| p.id).collect();
        let actual_sells: BTreeSet<Uuid> =
            open.iter().filter(|p| p.position_type == PositionType::Sell).map(|p| p.id).collect();

        let mut dirty = false;
        if state.open_position_ids != actual_buys {
            state.open_position_ids = actual_buys;
            dirty = true;
        }
        if state.open_sell_position_ids != actual_sells {
            state.open_sell_position_ids = actual_sells;
            dirty = true;
        }
        if dirty {
            state.last_updated = Utc::now();
            self.store.save_grid_state(&state).await?;
        }
        Ok(state)
    }

    /// `ProcessPrice`: one decision step. Idempotent-on-no-op — calling this
    /// repeatedly with an unchanged price and no matching gate produces no
    /// further state change beyond the timestamp fields (spec.md P6).
    #[allow(clippy::too_many_arguments)]
    pub async fn process_price(
        &self,
        wallet: &WalletAddress,
        order_id: Uuid,
        price: Decimal,
        spec: &OrderSpec,
        adapter: &Arc<dyn ExchangeAdapter>,
        wallet_settings: Option<&UserSettings>,
    ) -> GridCoreResult<GridState> {
        let Some(mut state) = self.store.find_grid_state(wallet, order_id).await? else {
            return Err(GridCoreError::Validation(format!("no grid state for order {order_id}")));
        };
        if !state.is_active {
            return Ok(state);
        }

        // Step 1: record the observed price, persisted immediately so a
        // crash between here and the first gate still reflects the tick.
        let now = Utc::now();
        state.last_known_price = price;
        state.last_price_update = now;
        self.store.save_grid_state(&state).await?;

        state = self.reconcile(wallet, state).await?;

        // Step 2: time-triggered focus reset, only when both trends are at rest.
        if spec.time_to_new_focus > 0
            && (now - state.focus_last_updated).num_seconds() >= spec.time_to_new_focus as i64
            && state.buy_trend_counter == 0
            && state.sell_trend_counter == 0
        {
            state.current_focus_price = price;
            state.focus_last_updated = now;
            state.next_buy_target = next_buy_target(price, 0, spec);
            state.next_sell_target = next_sell_target(price, 0, spec);
            state.last_updated = now;
            self.store.save_grid_state(&state).await?;
        }

        let ctx = ExecuteContext {
            store: &self.store,
            adapter,
            wallet_view: &self.wallet_view,
            audit: &self.audit,
            wallet,
            wallet_settings,
            spec,
        };

        // Step 3: BUY gate. Whatever ExecuteBuy does, this tick is spent.
        if should_buy(price, &state, spec) {
            return Ok(self.attempt_entry(order_id, "buy", execute::execute_buy(&ctx, price, state.clone()).await, state));
        }

        // Step 4: long-close sweep.
        state = self.run_long_close_sweep(&ctx, wallet, price, spec, state).await?;

        // Step 5: SELL-short gate.
        if should_sell_short(price, &state, spec) {
            return Ok(self.attempt_entry(
                order_id,
                "sell_short",
                execute::execute_sell_short(&ctx, price, state.clone()).await,
                state,
            ));
        }

        // Step 6: short-close sweep.
        state = self.run_short_close_sweep(&ctx, wallet, price, spec, state).await?;

        // Step 7: persist the final state (already persisted by any closes
        // that ran; this covers the case where neither sweep touched it).
        state.last_updated = now;
        self.store.save_grid_state(&state).await?;
        Ok(state)
    }

    /// Folds the outcome of an entry attempt (ExecuteBuy/ExecuteSellShort)
    /// back to a `GridState`: the new state on success, or the
    /// already-persisted prior state on any failure (silent skip or not).
    fn attempt_entry(
        &self,
        order_id: Uuid,
        step: &'static str,
        result: GridCoreResult<GridState>,
        fallback: GridState,
    ) -> GridState {
        match result {
            Ok(state) => state,
            Err(e) if e.is_silent_skip() => {
                log::debug!("order={order_id} {step} skipped: {e}");
                fallback
            }
            Err(e) => {
                log::warn!("order={order_id} {step} failed: {e}");
                fallback
            }
        }
    }

    async fn run_long_close_sweep(
        &self,
        ctx: &ExecuteContext<'_>,
        wallet: &WalletAddress,
        price: Decimal,
        spec: &OrderSpec,
        state: GridState,
    ) -> GridCoreResult<GridState> {
        let mut state = self.reconcile(wallet, state).await?;
        if long_close_threshold_blocks(price, &state, spec) {
            return Ok(state);
        }

        let mut candidates = self
            .store
            .find_positions_by_wallet_and_order(wallet, state.order_id, Some(PositionStatus::Open))
            .await?
            .into_iter()
            .filter(|p| p.position_type == PositionType::Buy)
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| a.target_price.cmp(&b.target_price));

        let mut closes = 0usize;
        for position in candidates {
            if closes >= MAX_CLOSES_PER_STEP {
                break;
            }
            if price < position.target_price {
                continue;
            }
            match execute::execute_buy_sell(ctx, price, position, state.clone()).await {
                Ok(new_state) => {
                    state = new_state;
                    closes += 1;
                }
                Err(e) if e.is_silent_skip() => log::debug!("order={} long close skipped: {e}", ctx.spec.id),
                Err(e) => log::warn!("order={} long close failed: {e}", ctx.spec.id),
            }
        }
        Ok(state)
    }

    async fn run_short_close_sweep(
        &self,
        ctx: &ExecuteContext<'_>,
        wallet: &WalletAddress,
        price: Decimal,
        _spec: &OrderSpec,
        state: GridState,
    ) -> GridCoreResult<GridState> {
        let mut state = self.reconcile(wallet, state).await?;

        let mut candidates = self
            .store
            .find_positions_by_wallet_and_order(wallet, state.order_id, Some(PositionStatus::Open))
            .await?
            .into_iter()
            .filter(|p| p.position_type == PositionType::Sell)
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| a.target_price.cmp(&b.target_price));

        let mut closes = 0usize;
        for position in candidates {
            if closes >= MAX_CLOSES_PER_STEP {
                break;
            }
            if price > position.target_price {
                continue;
            }
            match execute::execute_sell_buyback(ctx, price, position, state.clone()).await {
                Ok(new_state) => {
                    state = new_state;
                    closes += 1;
                }
                Err(e) if e.is_silent_skip() => log::debug!("order={} short close skipped: {e}", ctx.spec.id),
                Err(e) => log::warn!("order={} short close failed: {e}", ctx.spec.id),
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::paper::PaperBroker;
    use crate::model::{BudgetMode, Exchange, PlatformConfig, RangeRow, SideConditions, SideConfig, TrendPercentRow};
    use crate::store::JsonFileStore;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn s1_spec() -> OrderSpec {
        OrderSpec {
            id: Uuid::new_v4(),
            name: "s1".to_string(),
            is_active: true,
            exchange: Exchange::Asterdex,
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            refresh_interval: 1,
            min_profit_percent: dec!(0.5),
            focus_price: dec!(94000),
            time_to_new_focus: 0,
            buy: SideConfig {
                currency: "USDT".to_string(),
                wallet_protection: Decimal::ZERO,
                mode: BudgetMode::WalletLimit,
                max_value: Decimal::ZERO,
                add_profit: false,
            },
            sell: SideConfig {
                currency: "BTC".to_string(),
                wallet_protection: Decimal::ZERO,
                mode: BudgetMode::WalletLimit,
                max_value: Decimal::ZERO,
                add_profit: false,
            },
            buy_conditions: SideConditions {
                min_value_per_1_percent: dec!(200),
                price_threshold: dec!(100000),
                check_threshold_if_profitable: true,
            },
            sell_conditions: SideConditions {
                min_value_per_1_percent: dec!(200),
                price_threshold: dec!(89000),
                check_threshold_if_profitable: true,
            },
            trend_percents: vec![
                TrendPercentRow { trend: 0, buy_percent: Some(dec!(0.5)), sell_percent: Some(dec!(0.5)) },
                TrendPercentRow { trend: 1, buy_percent: Some(dec!(1)), sell_percent: Some(dec!(1)) },
                TrendPercentRow { trend: 2, buy_percent: Some(dec!(0.6)), sell_percent: Some(dec!(0.3)) },
                TrendPercentRow { trend: 5, buy_percent: Some(dec!(0.5)), sell_percent: Some(dec!(0.5)) },
                TrendPercentRow { trend: 10, buy_percent: Some(dec!(0.1)), sell_percent: Some(dec!(1)) },
            ],
            additional_buy_values: Vec::new(),
            additional_sell_values: Vec::new(),
            max_buy_per_transaction: vec![
                RangeRow { min_price: Some(dec!(0)), max_price: Some(dec!(89000)), price: None, condition: None, value: dec!(2000) },
                RangeRow { min_price: Some(dec!(89000)), max_price: Some(dec!(100000)), price: None, condition: None, value: dec!(700) },
                RangeRow { min_price: Some(dec!(100000)), max_price: None, price: None, condition: None, value: dec!(500) },
            ],
            max_sell_per_transaction: Vec::new(),
            buy_swing_percent: vec![
                RangeRow { min_price: Some(dec!(0)), max_price: Some(dec!(90000)), price: None, condition: None, value: dec!(0.1) },
                RangeRow { min_price: Some(dec!(90000)), max_price: Some(dec!(95000)), price: None, condition: None, value: dec!(0.2) },
                RangeRow { min_price: Some(dec!(95000)), max_price: Some(dec!(100000)), price: None, condition: None, value: dec!(0.5) },
                RangeRow { min_price: Some(dec!(100000)), max_price: None, price: None, condition: None, value: dec!(1) },
            ],
            sell_swing_percent: vec![
                RangeRow { min_price: Some(dec!(0)), max_price: Some(dec!(90000)), price: None, condition: None, value: dec!(0.1) },
                RangeRow { min_price: Some(dec!(90000)), max_price: Some(dec!(95000)), price: None, condition: None, value: dec!(0.2) },
                RangeRow { min_price: Some(dec!(95000)), max_price: Some(dec!(100000)), price: None, condition: None, value: dec!(0.5) },
                RangeRow { min_price: Some(dec!(100000)), max_price: None, price: None, condition: None, value: dec!(1) },
            ],
            platform: PlatformConfig::default(),
        }
    }

    async fn setup() -> (GridEngine, Arc<dyn Store>, Arc<dyn ExchangeAdapter>, WalletAddress, OrderSpec, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        let broker = Arc::new(PaperBroker::new(Exchange::Asterdex));
        broker.seed_balance("default", "USDT", dec!(10000)).await;
        let adapter: Arc<dyn ExchangeAdapter> = broker;
        let wallet = WalletAddress::new("0xabc");
        let spec = s1_spec();

        let mut settings = crate::model::UserSettings::new(wallet.clone());
        settings.orders.push(spec.clone());
        store.save_user_settings(&settings).await.unwrap();

        let wallet_view = Arc::new(WalletView::new());
        wallet_view
            .sync(
                wallet.as_str(),
                spec.exchange,
                HashMap::from([
                    ("USDT".to_string(), dec!(10000)),
                    (spec.base_asset.clone(), dec!(10000)),
                ]),
            )
            .await;

        let engine = GridEngine::new(store.clone(), wallet_view);
        engine.initialize_grid_state(&wallet, &spec).await.unwrap();

        (engine, store, adapter, wallet, spec, dir)
    }

    #[tokio::test]
    async fn s1_initial_buy_opens_a_long() {
        let (engine, store, adapter, wallet, spec, _dir) = setup().await;

        let state = engine.process_price(&wallet, spec.id, dec!(93500), &spec, &adapter, None).await.unwrap();

        assert_eq!(state.buy_trend_counter, 1);
        assert_eq!(state.current_focus_price, dec!(93500));
        assert_eq!(state.next_buy_target, dec!(92565));
        assert_eq!(state.open_position_ids.len(), 1);

        let position_id = *state.open_position_ids.iter().next().unwrap();
        let position = store.find_position_by_id(position_id).await.unwrap().unwrap();
        assert_eq!(position.entry_price, dec!(93500));
        assert_eq!(position.entry_value, dec!(100));
    }

    #[tokio::test]
    async fn s2_price_above_target_does_not_double_buy() {
        let (engine, _store, adapter, wallet, spec, _dir) = setup().await;
        engine.process_price(&wallet, spec.id, dec!(93500), &spec, &adapter, None).await.unwrap();

        let state = engine.process_price(&wallet, spec.id, dec!(93000), &spec, &adapter, None).await.unwrap();
        assert_eq!(state.buy_trend_counter, 1);
        assert_eq!(state.open_position_ids.len(), 1);
    }

    #[tokio::test]
    async fn s3_take_profit_closes_the_long() {
        let (engine, _store, adapter, wallet, spec, _dir) = setup().await;
        engine.process_price(&wallet, spec.id, dec!(93500), &spec, &adapter, None).await.unwrap();

        // Below target_sell_price (93967.50): no close yet.
        let state = engine.process_price(&wallet, spec.id, dec!(93900), &spec, &adapter, None).await.unwrap();
        assert_eq!(state.open_position_ids.len(), 1);

        let state = engine.process_price(&wallet, spec.id, dec!(94000), &spec, &adapter, None).await.unwrap();
        assert_eq!(state.open_position_ids.len(), 0);
        assert_eq!(state.buy_trend_counter, 0);
        assert_eq!(state.current_focus_price, dec!(94000));
        assert!(state.total_profit > Decimal::ZERO);
    }

    #[tokio::test]
    async fn s6_transaction_value_under_floor_skips_buy_silently() {
        let (engine, _store, adapter, wallet, mut spec, _dir) = setup().await;
        spec.buy_conditions.min_value_per_1_percent = dec!(5);

        let state = engine.process_price(&wallet, spec.id, dec!(93500), &spec, &adapter, None).await.unwrap();
        assert_eq!(state.buy_trend_counter, 0);
        assert_eq!(state.open_position_ids.len(), 0);
    }

    #[tokio::test]
    async fn round_trip_with_no_matching_gate_is_a_no_op_modulo_timestamp() {
        let (engine, _store, adapter, wallet, spec, _dir) = setup().await;
        let first = engine.process_price(&wallet, spec.id, dec!(93600), &spec, &adapter, None).await.unwrap();
        let second = engine.process_price(&wallet, spec.id, dec!(93600), &spec, &adapter, None).await.unwrap();

        assert_eq!(first.current_focus_price, second.current_focus_price);
        assert_eq!(first.buy_trend_counter, second.buy_trend_counter);
        assert_eq!(first.next_buy_target, second.next_buy_target);
        assert_eq!(first.open_position_ids, second.open_position_ids);
    }
}

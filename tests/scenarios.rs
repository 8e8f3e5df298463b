//! End-to-end grid scenarios (spec.md §8) and the universal property tests
//! that accompany them, driven through `GridEngine` against a real
//! `JsonFileStore` and `PaperBroker` — the same pair `Scheduler` wires up in
//! paper-trading mode.

use std::sync::Arc;

use grid_core::exchange::paper::PaperBroker;
use grid_core::exchange::ExchangeAdapter;
use grid_core::model::{
    BudgetMode, Exchange, OrderSpec, PlatformConfig, RangeRow, SideConditions, SideConfig,
    TrendPercentRow, UserSettings, WalletAddress,
};
use grid_core::store::{JsonFileStore, Store};
use grid_core::{GridEngine, WalletView};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use uuid::Uuid;

/// The S1-S4 spec used verbatim in spec.md §8.
fn scenario_spec() -> OrderSpec {
    OrderSpec {
        id: Uuid::new_v4(),
        name: "s1-s4".to_string(),
        is_active: true,
        exchange: Exchange::Asterdex,
        base_asset: "BTC".to_string(),
        quote_asset: "USDT".to_string(),
        refresh_interval: 1,
        min_profit_percent: dec!(0.5),
        focus_price: dec!(94000),
        time_to_new_focus: 0,
        buy: SideConfig { currency: "USDT".to_string(), wallet_protection: Decimal::ZERO, mode: BudgetMode::WalletLimit, max_value: Decimal::ZERO, add_profit: false },
        sell: SideConfig { currency: "BTC".to_string(), wallet_protection: Decimal::ZERO, mode: BudgetMode::WalletLimit, max_value: Decimal::ZERO, add_profit: false },
        buy_conditions: SideConditions { min_value_per_1_percent: dec!(200), price_threshold: dec!(100000), check_threshold_if_profitable: true },
        sell_conditions: SideConditions { min_value_per_1_percent: dec!(200), price_threshold: dec!(89000), check_threshold_if_profitable: true },
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

struct Harness {
    engine: GridEngine,
    store: Arc<dyn Store>,
    adapter: Arc<dyn ExchangeAdapter>,
    wallet: WalletAddress,
    spec: OrderSpec,
    _dir: tempfile::TempDir,
}

async fn setup() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
    let broker = Arc::new(PaperBroker::new(Exchange::Asterdex));
    broker.seed_balance("default", "USDT", dec!(10000)).await;
    let adapter: Arc<dyn ExchangeAdapter> = broker;
    let wallet = WalletAddress::new("0xabc");
    let spec = scenario_spec();

    let mut settings = UserSettings::new(wallet.clone());
    settings.orders.push(spec.clone());
    store.save_user_settings(&settings).await.unwrap();

    let wallet_view = Arc::new(WalletView::new());
    wallet_view
        .sync(
            wallet.as_str(),
            spec.exchange,
            HashMap::from([("USDT".to_string(), dec!(10000)), (spec.base_asset.clone(), dec!(10000))]),
        )
        .await;

    let engine = GridEngine::new(store.clone(), wallet_view);
    engine.initialize_grid_state(&wallet, &spec).await.unwrap();
    engine.start_grid(&wallet, spec.id).await.unwrap();

    Harness { engine, store, adapter, wallet, spec, _dir: dir }
}

#[tokio::test]
async fn s1_initial_buy_matches_spec_literal_values() {
    let h = setup().await;
    let state = h.engine.process_price(&h.wallet, h.spec.id, dec!(93500), &h.spec, &h.adapter, None).await.unwrap();

    assert_eq!(state.buy_trend_counter, 1);
    assert_eq!(state.current_focus_price, dec!(93500));
    assert_eq!(state.next_buy_target, dec!(92565));
    assert_eq!(state.open_position_ids.len(), 1);

    let position_id = *state.open_position_ids.iter().next().unwrap();
    let position = h.store.find_position_by_id(position_id).await.unwrap().unwrap();
    assert_eq!(position.entry_price, dec!(93500));
    assert_eq!(position.entry_value, dec!(100));
}

#[tokio::test]
async fn s2_price_above_target_does_not_double_buy() {
    let h = setup().await;
    h.engine.process_price(&h.wallet, h.spec.id, dec!(93500), &h.spec, &h.adapter, None).await.unwrap();
    let state = h.engine.process_price(&h.wallet, h.spec.id, dec!(93000), &h.spec, &h.adapter, None).await.unwrap();

    assert_eq!(state.buy_trend_counter, 1);
    assert_eq!(state.open_position_ids.len(), 1);
    assert_eq!(state.current_focus_price, dec!(93500));
}

#[tokio::test]
async fn s3_take_profit_closes_the_long_at_94000_not_before() {
    let h = setup().await;
    h.engine.process_price(&h.wallet, h.spec.id, dec!(93500), &h.spec, &h.adapter, None).await.unwrap();

    // target_sell_price = ceil(93500 * 1.005, 2) = 93967.50; 93900 is below it.
    let state = h.engine.process_price(&h.wallet, h.spec.id, dec!(93900), &h.spec, &h.adapter, None).await.unwrap();
    assert_eq!(state.open_position_ids.len(), 1);

    let state = h.engine.process_price(&h.wallet, h.spec.id, dec!(94000), &h.spec, &h.adapter, None).await.unwrap();
    assert_eq!(state.open_position_ids.len(), 0);
    assert_eq!(state.buy_trend_counter, 0);
    assert_eq!(state.current_focus_price, dec!(94000));
    assert_eq!(state.next_buy_target, dec!(93530));
    assert!(state.total_profit > Decimal::ZERO);
}

#[tokio::test]
async fn s4_threshold_blocks_buy_then_opens_a_short() {
    let h = setup().await;
    h.engine.process_price(&h.wallet, h.spec.id, dec!(93500), &h.spec, &h.adapter, None).await.unwrap();
    h.engine.process_price(&h.wallet, h.spec.id, dec!(94000), &h.spec, &h.adapter, None).await.unwrap();

    let state = h.engine.process_price(&h.wallet, h.spec.id, dec!(101000), &h.spec, &h.adapter, None).await.unwrap();

    // BUY is blocked by the 100000 price threshold; a short opens instead.
    assert_eq!(state.open_position_ids.len(), 0);
    assert_eq!(state.open_sell_position_ids.len(), 1);

    let position_id = *state.open_sell_position_ids.iter().next().unwrap();
    let position = h.store.find_position_by_id(position_id).await.unwrap().unwrap();
    assert_eq!(position.entry_price, dec!(101000));
    assert_eq!(position.target_price, dec!(100495));
}

#[tokio::test]
async fn s6_min_transaction_value_floor_skips_buy_silently() {
    let h = setup().await;
    let mut spec = h.spec.clone();
    spec.buy_conditions.min_value_per_1_percent = dec!(5);

    let state = h.engine.process_price(&h.wallet, spec.id, dec!(200000), &spec, &h.adapter, None).await.unwrap();
    assert_eq!(state.buy_trend_counter, 0);
    assert_eq!(state.open_position_ids.len(), 0);
}

#[tokio::test]
async fn p7_deleting_an_order_cascades_state_and_positions() {
    let h = setup().await;
    let state = h.engine.process_price(&h.wallet, h.spec.id, dec!(93500), &h.spec, &h.adapter, None).await.unwrap();
    assert_eq!(state.open_position_ids.len(), 1);
    let position_id = *state.open_position_ids.iter().next().unwrap();

    h.store.delete_order_cascade(&h.wallet, h.spec.id).await.unwrap();

    assert!(h.store.find_grid_state(&h.wallet, h.spec.id).await.unwrap().is_none());
    assert!(h.store.find_position_by_id(position_id).await.unwrap().is_none());
}

#[tokio::test]
async fn p6_round_trip_same_price_is_a_no_op_modulo_timestamps() {
    let h = setup().await;
    let first = h.engine.process_price(&h.wallet, h.spec.id, dec!(93600), &h.spec, &h.adapter, None).await.unwrap();
    let second = h.engine.process_price(&h.wallet, h.spec.id, dec!(93600), &h.spec, &h.adapter, None).await.unwrap();

    assert_eq!(first.current_focus_price, second.current_focus_price);
    assert_eq!(first.buy_trend_counter, second.buy_trend_counter);
    assert_eq!(first.sell_trend_counter, second.sell_trend_counter);
    assert_eq!(first.next_buy_target, second.next_buy_target);
    assert_eq!(first.next_sell_target, second.next_sell_target);
    assert_eq!(first.open_position_ids, second.open_position_ids);
    assert_eq!(first.total_profit, second.total_profit);
}

proptest! {
    /// (P3) The trend counters never leave `[0, maxTrend(spec)]`, for any
    /// sequence of prices a random walk around the focus might produce.
    #[test]
    fn p3_trend_counters_stay_within_bounds(steps in prop::collection::vec(90000i64..99000, 1..12)) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let h = setup().await;
            let max_trend = h.spec.max_trend();
            for step in steps {
                let price = Decimal::from(step);
                let state = h.engine.process_price(&h.wallet, h.spec.id, price, &h.spec, &h.adapter, None).await.unwrap();
                prop_assert!(state.buy_trend_counter >= 0 && state.buy_trend_counter <= max_trend);
                prop_assert!(state.sell_trend_counter >= 0 && state.sell_trend_counter <= max_trend);
            }
            Ok(())
        })?;
    }

    /// (P5) `next_buy_target <= focus` and `next_sell_target >= focus` must
    /// hold after every tick, for any price in a plausible trading range.
    #[test]
    fn p5_targets_stay_on_the_correct_side_of_focus(steps in prop::collection::vec(85000i64..105000, 1..12)) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let h = setup().await;
            for step in steps {
                let price = Decimal::from(step);
                let state = h.engine.process_price(&h.wallet, h.spec.id, price, &h.spec, &h.adapter, None).await.unwrap();
                prop_assert!(state.next_buy_target <= state.current_focus_price);
                prop_assert!(state.next_sell_target >= state.current_focus_price);
            }
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn p1_total_profit_matches_sum_of_closed_position_profits() {
    let h = setup().await;
    for price in [dec!(93500), dec!(93900), dec!(94000), dec!(93200), dec!(94200)] {
        h.engine.process_price(&h.wallet, h.spec.id, price, &h.spec, &h.adapter, None).await.unwrap();
    }

    let state = h.store.find_grid_state(&h.wallet, h.spec.id).await.unwrap().unwrap();
    let closed = h
        .store
        .find_positions_by_wallet_and_order(&h.wallet, h.spec.id, Some(grid_core::model::PositionStatus::Closed))
        .await
        .unwrap();
    let summed: Decimal = closed.iter().filter_map(|p| p.profit).sum();
    assert_eq!(state.total_profit, summed);
}

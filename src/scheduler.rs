//! `Scheduler` — the multi-order cooperative driver (spec.md §4.7, §5).
//!
//! A single task ticks at a configurable interval; each tick fans out to
//! every active order, refreshing prices in batches grouped by
//! `(wallet, exchange)` and throttling each order by its own
//! `refreshInterval`. `OrderLocks` keeps two ticks from racing the same
//! `(wallet, orderId)` — the one concurrency rule spec.md §5 insists on.
//!
//! Grounded in the teacher's `Bot::run()` event loop (`bot/runner.rs`):
//! same shape (a channel-free `tokio::select!` loop, cooperative shutdown,
//! best-effort per-step error handling that never propagates past the
//! loop), generalized from one strategy instance to N independently-ticked
//! orders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{watch, Mutex, RwLock};
use uuid::Uuid;

use crate::engine::GridEngine;
use crate::exchange::ExchangeAdapter;
use crate::model::{Exchange, GridState, OrderSpec, UserSettings, WalletAddress};
use crate::store::Store;

const TICK_DEADLINE: Duration = Duration::from_secs(30);

/// Keyed mutex map: one lock per `(wallet, orderId)`, created lazily.
/// `ProcessOrder` holds the corresponding lock for the whole decision step,
/// so two ticks (or a tick and an out-of-band control-plane call) can never
/// touch the same order's `Store` rows concurrently.
#[derive(Default)]
pub struct OrderLocks {
    inner: RwLock<HashMap<(WalletAddress, Uuid), Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, wallet: &WalletAddress, order_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.inner.read().await.get(&(wallet.clone(), order_id)) {
            return lock.clone();
        }
        self.inner
            .write()
            .await
            .entry((wallet.clone(), order_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Registry of one adapter per exchange variant the deployment trades on.
pub type AdapterRegistry = HashMap<Exchange, Arc<dyn ExchangeAdapter>>;

/// An active order resolved to its current owning wallet and settings, the
/// shape `run_tick` works with once the "owning wallet" scan has run.
struct ResolvedOrder {
    wallet: WalletAddress,
    settings: UserSettings,
    spec: OrderSpec,
    state: GridState,
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    engine: Arc<GridEngine>,
    price_feed: Arc<crate::price_feed::PriceFeed>,
    wallet_view: Arc<crate::wallet_view::WalletView>,
    adapters: AdapterRegistry,
    locks: OrderLocks,
    tick_interval: Duration,
    last_global_price_refresh: RwLock<Option<Instant>>,
    processing: AtomicBool,
}

impl Scheduler {
    /// `interval_secs` is clamped to `[1, 59]` per spec.md §6.4
    /// (`GRID_SCHEDULER_INTERVAL_SEC`).
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<GridEngine>,
        price_feed: Arc<crate::price_feed::PriceFeed>,
        wallet_view: Arc<crate::wallet_view::WalletView>,
        adapters: AdapterRegistry,
        interval_secs: u64,
    ) -> Self {
        Self {
            store,
            engine,
            price_feed,
            wallet_view,
            adapters,
            locks: OrderLocks::new(),
            tick_interval: Duration::from_secs(interval_secs.clamp(1, 59)),
            last_global_price_refresh: RwLock::new(None),
            processing: AtomicBool::new(false),
        }
    }

    /// Run the tick loop until `shutdown` carries `true`. New ticks stop
    /// starting immediately; a tick already in flight is given up to
    /// `TICK_DEADLINE` to finish before this returns.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.processing.swap(true, Ordering::SeqCst) {
                        log::warn!("scheduler tick skipped: previous tick still in flight");
                        continue;
                    }
                    match tokio::time::timeout(TICK_DEADLINE, self.run_tick()).await {
                        Ok(Err(e)) => log::error!("scheduler tick failed: {e}"),
                        Err(_) => log::error!("scheduler tick exceeded {:?} deadline", TICK_DEADLINE),
                        Ok(Ok(())) => {}
                    }
                    self.processing.store(false, Ordering::SeqCst);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One tick: §4.7's three numbered steps.
    async fn run_tick(&self) -> crate::error::GridCoreResult<()> {
        let active_states = self.store.find_all_active_grid_states().await?;
        if active_states.is_empty() {
            return Ok(());
        }

        let mut resolved = Vec::with_capacity(active_states.len());
        for state in active_states {
            match self.resolve_owner(&state).await? {
                Some((wallet, settings, spec)) => resolved.push(ResolvedOrder { wallet, settings, spec, state }),
                None => self.deactivate_dereferenced(state).await?,
            }
        }
        if resolved.is_empty() {
            return Ok(());
        }

        self.maybe_refresh_prices(&resolved).await;

        let futures = resolved.into_iter().map(|order| self.process_order(order));
        join_all(futures).await;
        Ok(())
    }

    /// Resolve the wallet that currently lists `state.order_id`, and that
    /// wallet's copy of the `OrderSpec`. `None` means the order has been
    /// deleted from every settings row — a dereferenced `GridState`.
    async fn resolve_owner(&self, state: &GridState) -> crate::error::GridCoreResult<Option<(WalletAddress, UserSettings, OrderSpec)>> {
        let Some(owner) = self.store.find_owning_wallet(state.order_id).await? else {
            return Ok(None);
        };
        let Some(settings) = self.store.find_user_settings(&owner).await? else {
            return Ok(None);
        };
        let Some(spec) = settings.orders.iter().find(|o| o.id == state.order_id).cloned() else {
            return Ok(None);
        };
        Ok(Some((owner, settings, spec)))
    }

    async fn deactivate_dereferenced(&self, mut state: GridState) -> crate::error::GridCoreResult<()> {
        log::warn!("order={} has no owning wallet; deactivating", state.order_id);
        state.is_active = false;
        state.last_updated = Utc::now();
        self.store.save_grid_state(&state).await
    }

    /// Step 2: refresh prices for every distinct `(wallet, exchange)` pair
    /// once the fastest active order's `refreshInterval` has elapsed.
    async fn maybe_refresh_prices(&self, orders: &[ResolvedOrder]) {
        let min_interval = orders.iter().map(|o| o.spec.refresh_interval).min().unwrap_or(1);
        let due = {
            let last = self.last_global_price_refresh.read().await;
            match *last {
                Some(t) => t.elapsed() >= Duration::from_secs(min_interval as u64),
                None => true,
            }
        };
        if !due {
            return;
        }

        let mut groups: HashMap<(WalletAddress, Exchange), Vec<String>> = HashMap::new();
        for order in orders {
            groups.entry((order.wallet.clone(), order.spec.exchange)).or_default().push(order.spec.symbol());
        }

        let refreshes = groups.into_iter().map(|((wallet, exchange), symbols)| async move {
            let Some(adapter) = self.adapters.get(&exchange) else { return };
            if let Err(e) = self.price_feed.refresh(adapter, wallet.as_str(), &symbols).await {
                log::warn!("price refresh failed for wallet={wallet} exchange={exchange}: {e}");
            }
        });
        join_all(refreshes).await;

        *self.last_global_price_refresh.write().await = Some(Instant::now());
    }

    /// Step 3: one order's decision step, serialized by `OrderLocks`.
    async fn process_order(&self, order: ResolvedOrder) {
        let lock = self.locks.get(&order.wallet, order.spec.id).await;
        let _guard = lock.lock().await;

        let elapsed = (Utc::now() - order.state.last_updated).num_seconds();
        if elapsed < order.spec.refresh_interval as i64 {
            return;
        }

        let Some(adapter) = self.adapters.get(&order.spec.exchange).cloned() else {
            log::warn!("order={} no adapter registered for {:?}", order.spec.id, order.spec.exchange);
            return;
        };

        match adapter.fetch_spot_account(Some(&order.settings)).await {
            Ok(balances) => self.wallet_view.sync(order.wallet.as_str(), order.spec.exchange, balances).await,
            Err(e) => log::debug!("order={} balance refresh failed, keeping last-known: {e}", order.spec.id),
        }

        let price = self.price_feed.get_price(order.wallet.as_str(), order.spec.exchange, &order.spec.symbol()).await;
        if price.is_zero() {
            log::debug!("order={} symbol {} has no known price yet", order.spec.id, order.spec.symbol());
            return;
        }

        if let Err(e) = self
            .engine
            .process_price(&order.wallet, order.spec.id, price, &order.spec, &adapter, Some(&order.settings))
            .await
        {
            log::error!("order={} process_price failed: {e}", order.spec.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::paper::PaperBroker;
    use crate::model::{BudgetMode, PlatformConfig, SideConditions, SideConfig, TrendPercentRow};
    use crate::store::JsonFileStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn sample_spec() -> OrderSpec {
        OrderSpec {
            id: Uuid::new_v4(),
            name: "t".to_string(),
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
            trend_percents: vec![TrendPercentRow { trend: 0, buy_percent: Some(dec!(0.5)), sell_percent: Some(dec!(0.5)) }],
            additional_buy_values: Vec::new(),
            additional_sell_values: Vec::new(),
            max_buy_per_transaction: Vec::new(),
            max_sell_per_transaction: Vec::new(),
            buy_swing_percent: Vec::new(),
            sell_swing_percent: Vec::new(),
            platform: PlatformConfig::default(),
        }
    }

    #[tokio::test]
    async fn order_locks_serialize_same_key() {
        let locks = OrderLocks::new();
        let wallet = WalletAddress::new("0xabc");
        let order_id = Uuid::new_v4();

        let a = locks.get(&wallet, order_id).await;
        let b = locks.get(&wallet, order_id).await;
        assert!(Arc::ptr_eq(&a, &b));

        let _guard = a.lock().await;
        assert!(b.try_lock().is_err());
    }

    #[tokio::test]
    async fn dereferenced_order_is_deactivated() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        let wallet_view = Arc::new(crate::wallet_view::WalletView::new());
        let engine = Arc::new(GridEngine::new(store.clone(), wallet_view.clone()));
        let spec = sample_spec();
        let wallet = WalletAddress::new("0xabc");

        engine.initialize_grid_state(&wallet, &spec).await.unwrap();
        engine.start_grid(&wallet, spec.id).await.unwrap();
        // No `UserSettings` row lists this order: it is dereferenced.

        let broker = Arc::new(PaperBroker::new(Exchange::Asterdex));
        let adapters: AdapterRegistry = [(Exchange::Asterdex, broker as Arc<dyn ExchangeAdapter>)].into_iter().collect();
        let scheduler = Scheduler::new(store.clone(), engine, Arc::new(crate::price_feed::PriceFeed::new()), wallet_view, adapters, 1);

        scheduler.run_tick().await.unwrap();

        let state = store.find_grid_state(&wallet, spec.id).await.unwrap().unwrap();
        assert!(!state.is_active);
    }

    #[tokio::test]
    async fn active_order_with_known_price_runs_a_decision_step() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        let wallet_view = Arc::new(crate::wallet_view::WalletView::new());
        let engine = Arc::new(GridEngine::new(store.clone(), wallet_view.clone()));
        let spec = sample_spec();
        let wallet = WalletAddress::new("0xabc");

        let mut settings = UserSettings::new(wallet.clone());
        settings.orders.push(spec.clone());
        store.save_user_settings(&settings).await.unwrap();

        engine.initialize_grid_state(&wallet, &spec).await.unwrap();
        engine.start_grid(&wallet, spec.id).await.unwrap();

        let broker = Arc::new(PaperBroker::new(Exchange::Asterdex));
        broker.seed_balance(wallet.as_str(), "USDT", dec!(10000)).await;
        broker.set_price(&spec.symbol(), dec!(93500)).await;
        let adapters: AdapterRegistry = [(Exchange::Asterdex, broker as Arc<dyn ExchangeAdapter>)].into_iter().collect();

        let scheduler = Scheduler::new(store.clone(), engine, Arc::new(crate::price_feed::PriceFeed::new()), wallet_view, adapters, 1);

        scheduler.run_tick().await.unwrap();

        let state = store.find_grid_state(&wallet, spec.id).await.unwrap().unwrap();
        assert_eq!(state.buy_trend_counter, 1);
        assert_eq!(state.open_position_ids.len(), 1);
    }
}

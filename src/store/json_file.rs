//! JSON-file-backed `Store` implementation.
//!
//! Three tables live in one `RwLock`-guarded in-memory structure; every
//! mutation holds the write lock for its whole duration, so any operation
//! that touches more than one table (e.g. "close position + update state")
//! is trivially a single transaction. Tables are flushed to disk as three
//! separate JSON documents, each written to a temp file and renamed into
//! place — the same atomic-write trick as the teacher's
//! `GridState::save_to_file_atomic`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::error::{GridCoreError, GridCoreResult};
use crate::model::{GridState, Position, PositionStatus, UserSettings, WalletAddress};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    user_settings: HashMap<WalletAddress, UserSettings>,
    grid_states: HashMap<(WalletAddress, Uuid), GridState>,
    positions: HashMap<Uuid, Position>,
}

// `HashMap` with a tuple key doesn't round-trip through `serde_json`'s map
// representation directly (object keys must be strings), so the on-disk
// shape flattens each table to a `Vec` and the in-memory shape keeps the
// map for O(1) lookups.
#[derive(Serialize, Deserialize)]
struct TablesOnDisk {
    user_settings: Vec<UserSettings>,
    grid_states: Vec<GridState>,
    positions: Vec<Position>,
}

impl From<&Tables> for TablesOnDisk {
    fn from(t: &Tables) -> Self {
        Self {
            user_settings: t.user_settings.values().cloned().collect(),
            grid_states: t.grid_states.values().cloned().collect(),
            positions: t.positions.values().cloned().collect(),
        }
    }
}

impl From<TablesOnDisk> for Tables {
    fn from(d: TablesOnDisk) -> Self {
        let mut t = Tables::default();
        for us in d.user_settings {
            t.user_settings.insert(us.wallet_address.clone(), us);
        }
        for gs in d.grid_states {
            t.grid_states.insert((gs.wallet_address.clone(), gs.order_id), gs);
        }
        for p in d.positions {
            t.positions.insert(p.id, p);
        }
        t
    }
}

/// JSON-file-backed store, one document under `data_dir`.
pub struct JsonFileStore {
    data_dir: PathBuf,
    tables: RwLock<Tables>,
}

impl JsonFileStore {
    /// Load existing state from `data_dir` (a single `store.json` document),
    /// or start empty if none exists yet.
    pub async fn open(data_dir: impl AsRef<Path>) -> GridCoreResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;
        let path = data_dir.join("store.json");
        let tables = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let on_disk: TablesOnDisk = serde_json::from_str(&content)?;
            Tables::from(on_disk)
        } else {
            Tables::default()
        };
        Ok(Self {
            data_dir,
            tables: RwLock::new(tables),
        })
    }

    fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    async fn flush_locked(&self, tables: &Tables) -> GridCoreResult<()> {
        let on_disk = TablesOnDisk::from(tables);
        let content = serde_json::to_string_pretty(&on_disk)?;
        let path = self.store_path();
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn find_user_settings(&self, wallet: &WalletAddress) -> GridCoreResult<Option<UserSettings>> {
        Ok(self.tables.read().await.user_settings.get(wallet).cloned())
    }

    async fn save_user_settings(&self, settings: &UserSettings) -> GridCoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .user_settings
            .insert(settings.wallet_address.clone(), settings.clone());
        self.flush_locked(&tables).await
    }

    async fn find_grid_state(&self, wallet: &WalletAddress, order_id: Uuid) -> GridCoreResult<Option<GridState>> {
        Ok(self
            .tables
            .read()
            .await
            .grid_states
            .get(&(wallet.clone(), order_id))
            .cloned())
    }

    async fn find_all_active_grid_states(&self) -> GridCoreResult<Vec<GridState>> {
        Ok(self
            .tables
            .read()
            .await
            .grid_states
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn find_all_grid_states_by_wallet(&self, wallet: &WalletAddress) -> GridCoreResult<Vec<GridState>> {
        Ok(self
            .tables
            .read()
            .await
            .grid_states
            .values()
            .filter(|s| &s.wallet_address == wallet)
            .cloned()
            .collect())
    }

    async fn save_grid_state(&self, state: &GridState) -> GridCoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .grid_states
            .insert((state.wallet_address.clone(), state.order_id), state.clone());
        self.flush_locked(&tables).await
    }

    async fn delete_grid_state_by_order(&self, order_id: Uuid) -> GridCoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.grid_states.retain(|(_, oid), _| *oid != order_id);
        self.flush_locked(&tables).await
    }

    async fn save_position(&self, position: &Position) -> GridCoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.positions.insert(position.id, position.clone());
        self.flush_locked(&tables).await
    }

    async fn find_position_by_id(&self, id: Uuid) -> GridCoreResult<Option<Position>> {
        Ok(self.tables.read().await.positions.get(&id).cloned())
    }

    async fn find_positions_by_ids(&self, ids: &[Uuid]) -> GridCoreResult<Vec<Position>> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.positions.get(id).cloned()).collect())
    }

    async fn find_positions_by_wallet_and_order(
        &self,
        wallet: &WalletAddress,
        order_id: Uuid,
        status: Option<PositionStatus>,
    ) -> GridCoreResult<Vec<Position>> {
        let tables = self.tables.read().await;
        Ok(tables
            .positions
            .values()
            .filter(|p| &p.wallet_address == wallet && p.order_id == order_id)
            .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn total_closed_profit(&self, wallet: &WalletAddress, order_id: Uuid) -> GridCoreResult<Decimal> {
        let tables = self.tables.read().await;
        Ok(tables
            .positions
            .values()
            .filter(|p| &p.wallet_address == wallet && p.order_id == order_id)
            .filter(|p| p.status == PositionStatus::Closed)
            .filter_map(|p| p.profit)
            .sum())
    }

    async fn delete_position(&self, id: Uuid) -> GridCoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.positions.remove(&id);
        self.flush_locked(&tables).await
    }

    async fn find_owning_wallet(&self, order_id: Uuid) -> GridCoreResult<Option<WalletAddress>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_settings
            .values()
            .find(|us| us.owns_order(order_id))
            .map(|us| us.wallet_address.clone()))
    }

    async fn record_open_position(&self, position: &Position, state: &GridState) -> GridCoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.positions.insert(position.id, position.clone());
        tables
            .grid_states
            .insert((state.wallet_address.clone(), state.order_id), state.clone());
        self.flush_locked(&tables).await
    }

    async fn record_closed_position(&self, position: &Position, state: &GridState) -> GridCoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.positions.insert(position.id, position.clone());
        tables
            .grid_states
            .insert((state.wallet_address.clone(), state.order_id), state.clone());
        self.flush_locked(&tables).await
    }

    async fn delete_order_cascade(&self, wallet: &WalletAddress, order_id: Uuid) -> GridCoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(us) = tables.user_settings.get_mut(wallet) {
            us.orders.retain(|o| o.id != order_id);
        } else {
            return Err(GridCoreError::Invariant(format!(
                "delete_order_cascade: no user_settings row for wallet {wallet}"
            )));
        }
        tables.grid_states.retain(|(_, oid), _| *oid != order_id);
        tables.positions.retain(|_, p| p.order_id != order_id);
        self.flush_locked(&tables).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Exchange;
    use rust_decimal_macros::dec;

    async fn temp_store() -> (JsonFileStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn round_trips_user_settings() {
        let (store, _dir) = temp_store().await;
        let wallet = WalletAddress::new("0xABC");
        let mut settings = UserSettings::new(wallet.clone());
        settings.exchange = Exchange::Bingx;
        store.save_user_settings(&settings).await.unwrap();

        let loaded = store.find_user_settings(&wallet).await.unwrap().unwrap();
        assert_eq!(loaded.wallet_address, wallet);
        assert_eq!(loaded.exchange, Exchange::Bingx);
    }

    #[tokio::test]
    async fn survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = WalletAddress::new("0xabc");
        let order_id = Uuid::new_v4();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            let state = GridState::new(wallet.clone(), order_id, dec!(100), dec!(99), dec!(101), chrono::Utc::now());
            store.save_grid_state(&state).await.unwrap();
        }
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let loaded = store.find_grid_state(&wallet, order_id).await.unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn cascade_delete_removes_state_and_positions() {
        let (store, _dir) = temp_store().await;
        let wallet = WalletAddress::new("0xabc");
        let order_id = Uuid::new_v4();
        let mut settings = UserSettings::new(wallet.clone());
        let mut spec = sample_order_spec(order_id);
        spec.id = order_id;
        settings.orders.push(spec);
        store.save_user_settings(&settings).await.unwrap();

        let state = GridState::new(wallet.clone(), order_id, dec!(100), dec!(99), dec!(101), chrono::Utc::now());
        store.save_grid_state(&state).await.unwrap();

        let position = Position::open_buy(
            wallet.clone(),
            order_id,
            dec!(100),
            dec!(1),
            dec!(100),
            0,
            dec!(101),
            chrono::Utc::now(),
        );
        store.save_position(&position).await.unwrap();

        store.delete_order_cascade(&wallet, order_id).await.unwrap();

        assert!(store.find_grid_state(&wallet, order_id).await.unwrap().is_none());
        assert!(store.find_position_by_id(position.id).await.unwrap().is_none());
        let settings = store.find_user_settings(&wallet).await.unwrap().unwrap();
        assert!(!settings.owns_order(order_id));
    }

    fn sample_order_spec(order_id: Uuid) -> crate::model::OrderSpec {
        use crate::model::*;
        OrderSpec {
            id: order_id,
            name: "test".into(),
            is_active: true,
            exchange: Exchange::Asterdex,
            base_asset: "BTC".into(),
            quote_asset: "USDT".into(),
            refresh_interval: 1,
            min_profit_percent: dec!(0.5),
            focus_price: dec!(100),
            time_to_new_focus: 0,
            buy: SideConfig {
                currency: "USDT".into(),
                wallet_protection: dec!(0),
                mode: BudgetMode::WalletLimit,
                max_value: dec!(0),
                add_profit: false,
            },
            sell: SideConfig {
                currency: "BTC".into(),
                wallet_protection: dec!(0),
                mode: BudgetMode::WalletLimit,
                max_value: dec!(0),
                add_profit: false,
            },
            buy_conditions: SideConditions {
                min_value_per_1_percent: dec!(200),
                price_threshold: dec!(0),
                check_threshold_if_profitable: true,
            },
            sell_conditions: SideConditions {
                min_value_per_1_percent: dec!(200),
                price_threshold: dec!(0),
                check_threshold_if_profitable: true,
            },
            trend_percents: vec![],
            additional_buy_values: vec![],
            additional_sell_values: vec![],
            max_buy_per_transaction: vec![],
            max_sell_per_transaction: vec![],
            buy_swing_percent: vec![],
            sell_swing_percent: vec![],
            platform: PlatformConfig { check_fee_profit: false },
        }
    }
}

//! Persistent state: the engine's single source of truth.
//!
//! `Store` is the abstract contract spec.md §4.2 describes ("persistent
//! KV/tabular store with three tables"). `JsonFileStore` is the one
//! implementation this crate ships, grounded in the teacher's
//! `GridState::save_to_file_atomic` / `StateManager` pattern generalized to
//! three tables. A real SQL or KV-backed implementation can be swapped in
//! later behind the same trait without touching `engine` or `scheduler`.

mod json_file;

pub use json_file::JsonFileStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::GridCoreResult;
use crate::model::{GridState, Position, PositionStatus, UserSettings, WalletAddress};

/// The storage contract the engine and scheduler depend on.
///
/// Any error returned from any method aborts the calling decision step;
/// no method here partially applies a multi-row change — see
/// `record_open_position`/`record_closed_position`/`delete_order_cascade`
/// for the operations spec.md calls out as needing single-transaction
/// semantics.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_settings(&self, wallet: &WalletAddress) -> GridCoreResult<Option<UserSettings>>;
    async fn save_user_settings(&self, settings: &UserSettings) -> GridCoreResult<()>;

    async fn find_grid_state(&self, wallet: &WalletAddress, order_id: Uuid) -> GridCoreResult<Option<GridState>>;
    async fn find_all_active_grid_states(&self) -> GridCoreResult<Vec<GridState>>;
    async fn find_all_grid_states_by_wallet(&self, wallet: &WalletAddress) -> GridCoreResult<Vec<GridState>>;
    async fn save_grid_state(&self, state: &GridState) -> GridCoreResult<()>;
    async fn delete_grid_state_by_order(&self, order_id: Uuid) -> GridCoreResult<()>;

    async fn save_position(&self, position: &Position) -> GridCoreResult<()>;
    async fn find_position_by_id(&self, id: Uuid) -> GridCoreResult<Option<Position>>;
    async fn find_positions_by_ids(&self, ids: &[Uuid]) -> GridCoreResult<Vec<Position>>;
    async fn find_positions_by_wallet_and_order(
        &self,
        wallet: &WalletAddress,
        order_id: Uuid,
        status: Option<PositionStatus>,
    ) -> GridCoreResult<Vec<Position>>;
    async fn total_closed_profit(&self, wallet: &WalletAddress, order_id: Uuid) -> GridCoreResult<Decimal>;
    async fn delete_position(&self, id: Uuid) -> GridCoreResult<()>;

    /// Scan across all `user_settings` rows for the wallet that currently
    /// lists `order_id` among its orders. Supports migrating an order
    /// between wallets without losing in-flight `GridState`/`Position` rows.
    async fn find_owning_wallet(&self, order_id: Uuid) -> GridCoreResult<Option<WalletAddress>>;

    /// Atomically persist a newly opened position alongside the state that
    /// now references it (I1: `open_position_ids`/`open_sell_position_ids`
    /// must include the new id).
    async fn record_open_position(&self, position: &Position, state: &GridState) -> GridCoreResult<()>;

    /// Atomically persist a closed position alongside the state update that
    /// follows from closing it (counters, totals, focus price).
    async fn record_closed_position(&self, position: &Position, state: &GridState) -> GridCoreResult<()>;

    /// I6: deleting an `OrderSpec` cascades to its `GridState` and all its
    /// `Position` rows, in the same transaction. Also strips the order from
    /// the owning wallet's `UserSettings.orders`.
    async fn delete_order_cascade(&self, wallet: &WalletAddress, order_id: Uuid) -> GridCoreResult<()>;
}

//! Shared data model: wallets, order specifications, grid state, and positions.

mod grid_state;
mod order_spec;
mod position;
mod settings;
mod wallet;

pub use grid_state::GridState;
pub use order_spec::{
    BudgetMode, Exchange, LegacyCondition, OrderSpec, PlatformConfig, RangeRow, SideConditions,
    SideConfig, TrendPercentRow,
};
pub use position::{Position, PositionStatus, PositionType};
pub use settings::{ApiConfigEntry, UserSettings, WalletBalanceEntry};
pub use wallet::WalletAddress;

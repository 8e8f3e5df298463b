//! `Position` — an immutable-identity, mutable-status record of one grid
//! entry and (once closed) its exit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::wallet::WalletAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionType {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub wallet_address: WalletAddress,
    pub order_id: Uuid,
    #[serde(rename = "type")]
    pub position_type: PositionType,
    pub status: PositionStatus,

    /// Entry price: `buyPrice` for a BUY, `sellPrice` for a SELL.
    pub entry_price: Decimal,
    pub amount: Decimal,
    /// Entry value: `buyValue` for a BUY, `sellValue` for a SELL.
    pub entry_value: Decimal,
    pub trend_at_entry: i32,
    /// `targetSellPrice` for a BUY, `targetBuybackPrice` for a SELL.
    pub target_price: Decimal,

    /// Exit price: `sellPrice` for a BUY close, `buyPrice` for a SELL close.
    #[serde(default)]
    pub exit_price: Option<Decimal>,
    /// Exit value: `sellValue` for a BUY close, `buyValue` for a SELL close.
    #[serde(default)]
    pub exit_value: Option<Decimal>,
    #[serde(default)]
    pub profit: Option<Decimal>,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Create a new OPEN long position at the given buy price.
    pub fn open_buy(
        wallet_address: WalletAddress,
        order_id: Uuid,
        buy_price: Decimal,
        amount: Decimal,
        buy_value: Decimal,
        trend_at_buy: i32,
        target_sell_price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_address,
            order_id,
            position_type: PositionType::Buy,
            status: PositionStatus::Open,
            entry_price: buy_price,
            amount,
            entry_value: buy_value,
            trend_at_entry: trend_at_buy,
            target_price: target_sell_price,
            exit_price: None,
            exit_value: None,
            profit: None,
            created_at: now,
            closed_at: None,
        }
    }

    /// Create a new OPEN short position at the given sell price.
    #[allow(clippy::too_many_arguments)]
    pub fn open_sell(
        wallet_address: WalletAddress,
        order_id: Uuid,
        sell_price: Decimal,
        amount: Decimal,
        sell_value: Decimal,
        trend_at_sell: i32,
        target_buyback_price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_address,
            order_id,
            position_type: PositionType::Sell,
            status: PositionStatus::Open,
            entry_price: sell_price,
            amount,
            entry_value: sell_value,
            trend_at_entry: trend_at_sell,
            target_price: target_buyback_price,
            exit_price: None,
            exit_value: None,
            profit: None,
            created_at: now,
            closed_at: None,
        }
    }

    pub fn close(&mut self, exit_price: Decimal, exit_value: Decimal, profit: Decimal, now: DateTime<Utc>) {
        self.exit_price = Some(exit_price);
        self.exit_value = Some(exit_value);
        self.profit = Some(profit);
        self.status = PositionStatus::Closed;
        self.closed_at = Some(now);
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

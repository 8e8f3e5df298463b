//! `GridState` — the 1:1 moving-reference companion to an active `OrderSpec`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::wallet::WalletAddress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridState {
    pub wallet_address: WalletAddress,
    pub order_id: Uuid,

    pub current_focus_price: Decimal,
    pub buy_trend_counter: i32,
    pub sell_trend_counter: i32,
    pub next_buy_target: Decimal,
    pub next_sell_target: Decimal,

    /// Ordered set of OPEN long position ids (ascending insertion order is
    /// not semantically meaningful; the engine always re-sorts by
    /// `target_price` before sweeping closes).
    pub open_position_ids: BTreeSet<Uuid>,
    pub open_sell_position_ids: BTreeSet<Uuid>,

    pub total_profit: Decimal,
    pub total_buy_transactions: u64,
    pub total_sell_transactions: u64,
    pub total_bought_value: Decimal,
    pub total_sold_value: Decimal,

    pub is_active: bool,

    pub focus_last_updated: DateTime<Utc>,
    pub last_known_price: Decimal,
    pub last_price_update: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl GridState {
    pub fn new(
        wallet_address: WalletAddress,
        order_id: Uuid,
        focus_price: Decimal,
        next_buy_target: Decimal,
        next_sell_target: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet_address,
            order_id,
            current_focus_price: focus_price,
            buy_trend_counter: 0,
            sell_trend_counter: 0,
            next_buy_target,
            next_sell_target,
            open_position_ids: BTreeSet::new(),
            open_sell_position_ids: BTreeSet::new(),
            total_profit: Decimal::ZERO,
            total_buy_transactions: 0,
            total_sell_transactions: 0,
            total_bought_value: Decimal::ZERO,
            total_sold_value: Decimal::ZERO,
            is_active: true,
            focus_last_updated: now,
            last_known_price: Decimal::ZERO,
            last_price_update: now,
            last_updated: now,
        }
    }
}

//! `UserSettings` — per-wallet configuration, keyed by canonicalized wallet address.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order_spec::{Exchange, OrderSpec};
use super::wallet::WalletAddress;

/// Encrypted (or, with no `API_ENCRYPTION_KEY` configured, plaintext)
/// API credentials for one exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfigEntry {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub api_key_encrypted: String,
    pub api_secret_encrypted: String,
}

/// Display cache of a wallet's balance for one currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBalanceEntry {
    pub currency: String,
    pub balance: Decimal,
    pub reserved: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub wallet_address: WalletAddress,
    #[serde(default)]
    pub exchange: Exchange,
    #[serde(default)]
    pub api_config: std::collections::HashMap<Exchange, ApiConfigEntry>,
    #[serde(default)]
    pub wallet: Vec<WalletBalanceEntry>,
    #[serde(default)]
    pub orders: Vec<OrderSpec>,
}

impl UserSettings {
    pub fn new(wallet_address: WalletAddress) -> Self {
        Self {
            wallet_address,
            exchange: Exchange::default(),
            api_config: std::collections::HashMap::new(),
            wallet: Vec::new(),
            orders: Vec::new(),
        }
    }

    /// Does this settings row currently list `order_id` among its orders?
    /// Used by the "owning wallet" scan (an order may have been moved
    /// between wallets without the old `GridState` row being aware).
    pub fn owns_order(&self, order_id: uuid::Uuid) -> bool {
        self.orders.iter().any(|o| o.id == order_id)
    }
}

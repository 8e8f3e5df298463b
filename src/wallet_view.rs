//! Two-level wallet balance cache (spec.md §4.5).
//!
//! `wallet → exchange → currency → balance`. A paper wallet gets a built-in
//! default ledger the first time it's seen; a live wallet's balances always
//! come from `ExchangeAdapter::fetch_spot_account` via `sync`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::model::{Exchange, WalletBalanceEntry};

fn default_paper_ledger() -> HashMap<String, Decimal> {
    let mut ledger = HashMap::new();
    ledger.insert("USDT".to_string(), dec!(10000));
    ledger
}

/// `wallet address → exchange → currency → balance`.
#[derive(Default)]
pub struct WalletView {
    balances: RwLock<HashMap<(String, Exchange), HashMap<String, Decimal>>>,
}

impl WalletView {
    pub fn new() -> Self {
        Self { balances: RwLock::new(HashMap::new()) }
    }

    /// Replace the balance set for `(wallet, exchange)` atomically.
    pub async fn sync(&self, wallet: &str, exchange: Exchange, balances: HashMap<String, Decimal>) {
        let mut guard = self.balances.write().await;
        guard.insert((wallet.to_string(), exchange), balances);
    }

    /// Balance for `currency` under `(wallet, exchange)`, seeding a default
    /// paper ledger on first access if nothing has been synced yet.
    pub async fn get_balance(&self, wallet: &str, exchange: Exchange, currency: &str) -> Decimal {
        let guard = self.balances.read().await;
        guard.get(&(wallet.to_string(), exchange)).and_then(|l| l.get(currency)).copied().unwrap_or(Decimal::ZERO)
    }

    /// Seed `(wallet, exchange)` with the built-in default paper ledger if it
    /// has never been synced. No-op for wallets that already have a cache
    /// entry (real or paper).
    pub async fn ensure_seeded(&self, wallet: &str, exchange: Exchange) {
        let mut guard = self.balances.write().await;
        guard.entry((wallet.to_string(), exchange)).or_insert_with(default_paper_ledger);
    }

    /// Project the current `(wallet, exchange)` balances into the
    /// `UserSettings.wallet` display cache shape (spec.md §4.5).
    pub async fn as_display_cache(&self, wallet: &str, exchange: Exchange) -> Vec<WalletBalanceEntry> {
        let guard = self.balances.read().await;
        guard
            .get(&(wallet.to_string(), exchange))
            .map(|ledger| {
                ledger
                    .iter()
                    .map(|(currency, balance)| WalletBalanceEntry {
                        currency: currency.clone(),
                        balance: *balance,
                        reserved: Decimal::ZERO,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsynced_wallet_reports_zero_until_seeded() {
        let view = WalletView::new();
        assert_eq!(view.get_balance("w1", Exchange::Asterdex, "USDT").await, Decimal::ZERO);
        view.ensure_seeded("w1", Exchange::Asterdex).await;
        assert_eq!(view.get_balance("w1", Exchange::Asterdex, "USDT").await, dec!(10000));
    }

    #[tokio::test]
    async fn sync_replaces_balance_set_atomically() {
        let view = WalletView::new();
        let mut balances = HashMap::new();
        balances.insert("USDT".to_string(), dec!(500));
        balances.insert("BTC".to_string(), dec!(0.01));
        view.sync("w1", Exchange::Asterdex, balances).await;

        assert_eq!(view.get_balance("w1", Exchange::Asterdex, "USDT").await, dec!(500));
        assert_eq!(view.get_balance("w1", Exchange::Asterdex, "BTC").await, dec!(0.01));

        let mut replacement = HashMap::new();
        replacement.insert("USDT".to_string(), dec!(100));
        view.sync("w1", Exchange::Asterdex, replacement).await;
        assert_eq!(view.get_balance("w1", Exchange::Asterdex, "USDT").await, dec!(100));
        assert_eq!(view.get_balance("w1", Exchange::Asterdex, "BTC").await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn display_cache_reflects_synced_balances() {
        let view = WalletView::new();
        let mut balances = HashMap::new();
        balances.insert("USDT".to_string(), dec!(250));
        view.sync("w1", Exchange::Asterdex, balances).await;

        let cache = view.as_display_cache("w1", Exchange::Asterdex).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache[0].currency, "USDT");
        assert_eq!(cache[0].balance, dec!(250));
    }
}

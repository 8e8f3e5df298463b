//! Top-level wiring: turns a `RuntimeConfig` into a running `Scheduler`.
//!
//! Grounded in the teacher's `BotRunner` (same job — load config, build the
//! concrete collaborators, hand them to the event loop — just over
//! `GridEngine`/`Scheduler` instead of `Bot`/`HyperliquidMarket`).

use std::sync::Arc;

use log::info;
use tokio::sync::watch;

use crate::audit::LoggingCalcTraceSink;
use crate::config::RuntimeConfig;
use crate::engine::GridEngine;
use crate::exchange::aster::AsterAdapter;
use crate::exchange::bingx::BingxAdapter;
use crate::exchange::paper::PaperBroker;
use crate::exchange::{ExchangeAdapter, PlaintextCipher};
use crate::model::Exchange;
use crate::price_feed::PriceFeed;
use crate::scheduler::{AdapterRegistry, Scheduler};
use crate::store::{JsonFileStore, Store};
use crate::wallet_view::WalletView;

/// Owns every long-lived collaborator the scheduler loop needs. Built once
/// at startup from a `RuntimeConfig`; no global/static state anywhere in
/// this crate (spec.md §9's `RuntimeContext` note).
pub struct Runner {
    config: RuntimeConfig,
    scheduler: Arc<Scheduler>,
}

impl Runner {
    /// Load configuration from `config_path` and wire up the store, engine,
    /// adapters, and scheduler. `PAPER_TRADING` (default true) swaps real
    /// exchange adapters for `PaperBroker`.
    pub async fn build(config_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config = RuntimeConfig::load(config_path)?;

        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "info");
        }
        env_logger::try_init().ok();

        let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(&config.store_path).await?);
        let wallet_view = Arc::new(WalletView::new());
        let engine = if config.paper_trading {
            Arc::new(GridEngine::new(store.clone(), wallet_view.clone()))
        } else {
            Arc::new(GridEngine::with_audit(store.clone(), wallet_view.clone(), Arc::new(LoggingCalcTraceSink)))
        };
        let price_feed = Arc::new(PriceFeed::new());
        let adapters = build_adapters(&config);

        let scheduler = Arc::new(Scheduler::new(
            store,
            engine,
            price_feed,
            wallet_view,
            adapters,
            config.scheduler_interval_sec,
        ));

        Ok(Self { config, scheduler })
    }

    /// Run the scheduler loop until the process receives a shutdown signal
    /// (ctrl-c). Matches the teacher's `market.start()` call: this is the
    /// point the process blocks at.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "starting grid scheduler: interval={}s paper_trading={}",
            self.config.scheduler_interval_sec, self.config.paper_trading
        );

        let (tx, rx) = watch::channel(false);
        let scheduler = self.scheduler.clone();
        let handle = tokio::spawn(scheduler.run(rx));

        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        let _ = tx.send(true);
        handle.await?;
        Ok(())
    }
}

fn build_adapters(config: &RuntimeConfig) -> AdapterRegistry {
    let mut adapters: AdapterRegistry = AdapterRegistry::new();
    if config.paper_trading {
        adapters.insert(Exchange::Asterdex, Arc::new(PaperBroker::new(Exchange::Asterdex)) as Arc<dyn ExchangeAdapter>);
        adapters.insert(Exchange::Bingx, Arc::new(PaperBroker::new(Exchange::Bingx)) as Arc<dyn ExchangeAdapter>);
    } else {
        let cipher = Arc::new(PlaintextCipher);
        adapters.insert(
            Exchange::Asterdex,
            Arc::new(AsterAdapter::new(cipher.clone(), config.fallback_credentials.clone())) as Arc<dyn ExchangeAdapter>,
        );
        adapters.insert(
            Exchange::Bingx,
            Arc::new(BingxAdapter::new(cipher, config.fallback_credentials.clone())) as Arc<dyn ExchangeAdapter>,
        );
    }
    adapters
}

#![deny(unreachable_pub)]

pub mod audit;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod model;
pub mod price_feed;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod wallet_view;

pub use audit::{CalcTraceRecord, CalcTraceSink, LoggingCalcTraceSink, NoOpCalcTraceSink};
pub use engine::GridEngine;
pub use error::{GridCoreError, GridCoreResult};
pub use price_feed::PriceFeed;
pub use scheduler::{AdapterRegistry, OrderLocks, Scheduler};
pub use store::Store;
pub use wallet_view::WalletView;

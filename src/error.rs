//! Error taxonomy for the grid core.
//!
//! Every decision step returns a `GridCoreResult`; nothing propagates past the
//! scheduler as a panic or an unhandled `Err` — see `scheduler::Scheduler` for
//! how each variant is handled at the boundary.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised throughout the grid core.
#[derive(Error, Debug, Clone)]
pub enum GridCoreError {
    /// Bad symbol, malformed settings row, or a decimal that failed to parse.
    /// Aborts the decision step; logged at WARN.
    #[error("validation error: {0}")]
    Validation(String),

    /// A gate (threshold, swing, wallet mode, min-tx-value, fee-eats-profit)
    /// rejected the action. Silently skip this tick's action; DEBUG log.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// `canExecuteBuy`/`canExecuteSell` found insufficient funds. Skip; DEBUG log.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// Adapter HTTP non-2xx or timeout. Skip step; WARN log with exchange
    /// message. No position row is written.
    #[error("exchange error: {0}")]
    Exchange(String),

    /// `PlaceSpotBuy`'s symbol validation found the symbol missing or not
    /// `TRADING`; carries up to 10 alternates for the same asset pair
    /// (spec.md §4.3). Treated as a validation failure: abort the step.
    #[error("symbol {symbol} not tradeable; alternates: {alternates:?}")]
    InvalidSymbol { symbol: String, alternates: Vec<String> },

    /// No credentials resolved for a signed endpoint. Skip order for this
    /// tick; WARN logged once per order per hour by the caller.
    #[error("missing credentials for exchange")]
    MissingCredentials,

    /// Transactional store write failed. Abort step; ERROR log; next tick retries.
    #[error("store error: {0}")]
    Store(String),

    /// Reconciler found a mismatch it could not repair. ERROR log; caller
    /// must set `isActive := false` for the affected order.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Result alias used throughout the crate.
pub type GridCoreResult<T> = std::result::Result<T, GridCoreError>;

impl From<serde_json::Error> for GridCoreError {
    fn from(err: serde_json::Error) -> Self {
        GridCoreError::Store(err.to_string())
    }
}

impl From<std::io::Error> for GridCoreError {
    fn from(err: std::io::Error) -> Self {
        GridCoreError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for GridCoreError {
    fn from(err: reqwest::Error) -> Self {
        GridCoreError::Exchange(err.to_string())
    }
}

impl GridCoreError {
    /// True for the error kinds that mean "skip this tick, no alarm needed" —
    /// as opposed to `Store`/`Invariant`, which warrant escalation.
    pub fn is_silent_skip(&self) -> bool {
        matches!(
            self,
            GridCoreError::PolicyDenied(_)
                | GridCoreError::InsufficientBalance { .. }
                | GridCoreError::MissingCredentials
        )
    }
}

//! Calculation-trace observability sink.
//!
//! Per Design Notes, per-step "calculation details" are not appended to
//! position JSON the way the source did it — that coupled the algorithm to
//! a UI-facing log format. Instead `GridEngine` emits a `CalcTraceRecord` at
//! each decision sub-step to whatever `CalcTraceSink` it was built with.
//! Persistence of these records, if wanted, is an external collaborator.

use rust_decimal::Decimal;
use uuid::Uuid;

/// One decision sub-step's inputs and outcome, named the way the engine's
/// own sub-step methods are named (`should_buy`, `execute_buy`, ...).
#[derive(Debug, Clone)]
pub struct CalcTraceRecord {
    pub order_id: Uuid,
    pub step: &'static str,
    pub price: Decimal,
    pub decision: String,
    pub detail: String,
}

/// Sink for `CalcTraceRecord`s. Implementations must not block the decision
/// step for long; a sink that wants durable storage should queue and flush
/// asynchronously out-of-band.
pub trait CalcTraceSink: Send + Sync {
    fn record(&self, record: CalcTraceRecord);
}

/// Discards every record. The engine's default when no sink is configured.
pub struct NoOpCalcTraceSink;

impl CalcTraceSink for NoOpCalcTraceSink {
    fn record(&self, _record: CalcTraceRecord) {}
}

/// Emits each record as a `log::debug!` line, matching the teacher's
/// debug-heavy instrumentation of rounding/sizing decisions.
pub struct LoggingCalcTraceSink;

impl CalcTraceSink for LoggingCalcTraceSink {
    fn record(&self, record: CalcTraceRecord) {
        log::debug!(
            "order={} step={} price={} decision={} detail={}",
            record.order_id,
            record.step,
            record.price,
            record.decision,
            record.detail
        );
    }
}

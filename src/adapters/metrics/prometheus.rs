//! Prometheus Metrics Registry - Exchange Observability
//!
//! Registers the exchange's Prometheus metrics and renders them in the
//! text exposition format for the `/metrics` route. Covers committed
//! trades, rejections, trade latency and settlement credits.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::domain::error::EngineError;
use crate::domain::market::Outcome;
use crate::domain::payout::SettlementKind;

/// Centralized Prometheus metrics for the exchange.
///
/// All metrics follow the naming convention `lmsr_exchange_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Trade latency histogram (microseconds), by trade kind.
    pub trade_latency_us: HistogramVec,
    /// Committed trades, by kind and side.
    pub trades_committed: IntCounterVec,
    /// Rejected requests, by operation and error kind.
    pub requests_rejected: IntCounterVec,
    /// Settlement credits written, by kind.
    pub settlement_credits: IntCounterVec,
    /// Transaction attempts lost to a concurrent writer.
    pub store_conflicts: IntGauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let trade_latency_us = HistogramVec::new(
            HistogramOpts::new(
                "lmsr_exchange_trade_latency_us",
                "Trade commit latency in microseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 25000.0, 100_000.0,
            ]),
            &["kind"],
        )?;

        let trades_committed = IntCounterVec::new(
            Opts::new("lmsr_exchange_trades_committed_total", "Total trades committed"),
            &["kind", "side"],
        )?;

        let requests_rejected = IntCounterVec::new(
            Opts::new(
                "lmsr_exchange_requests_rejected_total",
                "Total requests rejected by the engine",
            ),
            &["operation", "reason"],
        )?;

        let settlement_credits = IntCounterVec::new(
            Opts::new(
                "lmsr_exchange_settlement_credits_total",
                "Total payouts and refunds credited",
            ),
            &["kind"],
        )?;

        let store_conflicts = IntGauge::new(
            "lmsr_exchange_store_conflicts",
            "Transaction attempts retried after a write conflict",
        )?;

        registry.register(Box::new(trade_latency_us.clone()))?;
        registry.register(Box::new(trades_committed.clone()))?;
        registry.register(Box::new(requests_rejected.clone()))?;
        registry.register(Box::new(settlement_credits.clone()))?;
        registry.register(Box::new(store_conflicts.clone()))?;

        Ok(Self {
            registry,
            trade_latency_us,
            trades_committed,
            requests_rejected,
            settlement_credits,
            store_conflicts,
        })
    }

    /// Record a committed buy or sale.
    pub fn record_trade(&self, kind: &str, side: Outcome, latency_us: f64) {
        let side = side.to_string();
        self.trades_committed
            .with_label_values(&[kind, side.as_str()])
            .inc();
        self.trade_latency_us
            .with_label_values(&[kind])
            .observe(latency_us);
    }

    /// Record an engine rejection for `operation`.
    pub fn record_rejection(&self, operation: &str, error: &EngineError) {
        self.requests_rejected
            .with_label_values(&[operation, error.kind()])
            .inc();
    }

    /// Record credits written by a settlement sweep.
    pub fn record_settlement(&self, kind: SettlementKind, credited: usize) {
        let kind = kind.to_string();
        self.settlement_credits
            .with_label_values(&[kind.as_str()])
            .inc_by(credited as u64);
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_series() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_trade("buy", Outcome::Yes, 120.0);
        metrics.record_rejection("bet", &EngineError::invalid("amount"));
        metrics.record_settlement(SettlementKind::Refund, 3);

        let text = metrics.render().unwrap();
        assert!(text.contains("lmsr_exchange_trades_committed_total{kind=\"buy\",side=\"YES\"} 1"));
        assert!(text.contains("reason=\"invalid_parameter\""));
        assert!(text.contains("lmsr_exchange_settlement_credits_total{kind=\"REFUND\"} 3"));
    }
}

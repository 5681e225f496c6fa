//! Engine metrics: prometheus counters for bet intake, settlement, and
//! balance reconciliation.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Shared counters registered against one prometheus registry.
pub struct EngineMetrics {
    registry: Registry,
    pub bets_accepted: IntCounterVec,
    pub bets_rejected: IntCounterVec,
    pub rounds_settled: IntCounterVec,
    pub payouts_total: IntCounterVec,
    pub settlement_retries: IntCounter,
    pub settlement_escalations: IntCounter,
    pub reconcile_fetches: IntCounter,
    pub reconcile_failures: IntCounter,
}

impl EngineMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bets_accepted = IntCounterVec::new(
            Opts::new("roundhouse_bets_accepted_total", "Bets accepted, by game"),
            &["game"],
        )
        .unwrap();
        let bets_rejected = IntCounterVec::new(
            Opts::new("roundhouse_bets_rejected_total", "Bets rejected, by reason"),
            &["reason"],
        )
        .unwrap();
        let rounds_settled = IntCounterVec::new(
            Opts::new("roundhouse_rounds_settled_total", "Rounds fully settled, by game"),
            &["game"],
        )
        .unwrap();
        let payouts_total = IntCounterVec::new(
            Opts::new(
                "roundhouse_payouts_minor_units_total",
                "Gross payouts credited in minor units, by game",
            ),
            &["game"],
        )
        .unwrap();
        let settlement_retries = IntCounter::new(
            "roundhouse_settlement_retries_total",
            "Individual bet settlement retries",
        )
        .unwrap();
        let settlement_escalations = IntCounter::new(
            "roundhouse_settlement_escalations_total",
            "Bets that exhausted their settlement retry budget",
        )
        .unwrap();
        let reconcile_fetches = IntCounter::new(
            "roundhouse_reconcile_fetches_total",
            "Balance reconciliation fetches issued",
        )
        .unwrap();
        let reconcile_failures = IntCounter::new(
            "roundhouse_reconcile_failures_total",
            "Balance reconciliation fetches that failed or timed out",
        )
        .unwrap();

        registry.register(Box::new(bets_accepted.clone())).unwrap();
        registry.register(Box::new(bets_rejected.clone())).unwrap();
        registry.register(Box::new(rounds_settled.clone())).unwrap();
        registry.register(Box::new(payouts_total.clone())).unwrap();
        registry.register(Box::new(settlement_retries.clone())).unwrap();
        registry.register(Box::new(settlement_escalations.clone())).unwrap();
        registry.register(Box::new(reconcile_fetches.clone())).unwrap();
        registry.register(Box::new(reconcile_failures.clone())).unwrap();

        Self {
            registry,
            bets_accepted,
            bets_rejected,
            rounds_settled,
            payouts_total,
            settlement_retries,
            settlement_escalations,
            reconcile_fetches,
            reconcile_failures,
        }
    }

    /// Render all registered metrics in the prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("metrics encoding failed: {}", err);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_export() {
        let metrics = EngineMetrics::new();
        metrics.bets_accepted.with_label_values(&["lottery-30s"]).inc();
        metrics.bets_rejected.with_label_values(&["ROUND_NOT_OPEN"]).inc();
        metrics.settlement_retries.inc();

        let exported = metrics.export();
        assert!(exported.contains("roundhouse_bets_accepted_total"));
        assert!(exported.contains("lottery-30s"));
        assert!(exported.contains("ROUND_NOT_OPEN"));
    }
}

use models::constants::REASON_PROCESS_FAILED;

use opentelemetry::{
    metrics::{Counter, Meter},
    Key,
};
use tracing::instrument;

const OUTCOME_KEY: Key = Key::from_static_str("outcome");

/// Counts reconciliations of KubeletConfigs by their outcome.
#[derive(Clone)]
pub struct ReconcileMetrics {
    reconciliations: Counter<u64>,
}

impl ReconcileMetrics {
    #[instrument(skip(meter))]
    pub fn new(meter: Meter) -> Self {
        let reconciliations = meter
            .u64_counter("nrop_kubeletconfig_reconcile_total")
            .with_description("KubeletConfig reconciliations, by outcome")
            .init();

        ReconcileMetrics { reconciliations }
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.reconciliations
            .add(1, &[OUTCOME_KEY.string(outcome.to_string())]);
    }

    pub fn record_failure(&self) {
        self.record_outcome(REASON_PROCESS_FAILED);
    }
}

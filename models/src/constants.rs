pub const DEFAULT_NAMESPACE: &str = "numaresources";
pub const DEFAULT_DECLARATION_NAME: &str = "numaresourcesoperator";

/// The only key held by a published RTE configuration `ConfigMap`.
pub const RTE_CONFIG_KEY: &str = "config.yaml";

// controller constants
pub const CONTROLLER: &str = "numaresources-controller";
pub const CONTROLLER_INTERNAL_PORT: i32 = 8080; // The internal port on which controller metrics are vended.

// Event reasons attached to the declaration after each reconciliation.
pub const REASON_PROCESS_OK: &str = "ProcessOK";
pub const REASON_PROCESS_FAILED: &str = "ProcessFailed";
pub const REASON_PROCESS_SKIP: &str = "ProcessSkip";

/// Metrics label for reconciliations still waiting on the NUMAResourcesOperator. No event is recorded for it.
pub const REASON_WAITING: &str = "Waiting";

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The `NUMAResourcesOperatorSpec` declares which groups of worker nodes take part in NUMA-aware resource
/// management. The declaration is cluster-scoped and is expected to exist under a single well-known name; until
/// it does, kubelet configuration changes are not acted upon.
#[derive(Clone, CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    derive = "Default",
    derive = "PartialEq",
    group = "nodetopology.openshift.io",
    kind = "NUMAResourcesOperator",
    plural = "numaresourcesoperators",
    shortname = "nro",
    singular = "numaresourcesoperator",
    version = "v1"
)]
#[serde(rename_all = "camelCase")]
pub struct NUMAResourcesOperatorSpec {
    /// Worker node groups, evaluated in order. The first group whose selector matches a pool wins.
    #[serde(default)]
    pub node_groups: Vec<NodeGroup>,
    /// Pods which the node-local agent should not account for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_excludes: Option<Vec<NamespacedName>>,
}

/// A group of worker nodes, identified by the labels of the `MachineConfigPool` that manages them.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_config_pool_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<NodeGroupConfig>,
}

/// Per-group tuning for the node-local agent.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_refresh_mode: Option<InfoRefreshMode>,
    /// Period between periodic resource reports, as a Go-style duration string (e.g. `10s`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_refresh_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods_fingerprinting: Option<PodsFingerprintingMode>,
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq, JsonSchema)]
pub enum InfoRefreshMode {
    Periodic,
    Events,
    PeriodicAndEvents,
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq, JsonSchema)]
pub enum PodsFingerprintingMode {
    Disabled,
    Enabled,
    EnabledExclusiveResources,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NUMAResourcesOperator {
    /// Creates a declaration holding one `NodeGroup` per selector, without any per-group configuration.
    pub fn with_selectors(name: &str, selectors: Vec<LabelSelector>) -> Self {
        let node_groups = selectors
            .into_iter()
            .map(|selector| NodeGroup {
                machine_config_pool_selector: Some(selector),
                config: None,
            })
            .collect();

        NUMAResourcesOperator::new(
            name,
            NUMAResourcesOperatorSpec {
                node_groups,
                pod_excludes: None,
            },
        )
    }

    /// Folds the declared pod excludes into the `namespace -> name` mapping consumed by the node-local agent.
    /// When a namespace appears more than once, the last entry wins.
    pub fn pod_excludes(&self) -> BTreeMap<String, String> {
        self.spec
            .pod_excludes
            .iter()
            .flatten()
            .map(|excluded| (excluded.namespace.clone(), excluded.name.clone()))
            .collect()
    }
}

/// Returns the name of the RTE configuration artifact published for a given declaration and pool.
pub fn component_name(declaration_name: &str, pool_name: &str) -> String {
    format!("{}-{}", declaration_name, pool_name)
}

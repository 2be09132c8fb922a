//! Resources owned by the machine-config operator which the controller consumes.
use crate::kubelet::{KubeletConfigError, KubeletConfiguration};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A `MachineConfigPool` groups worker nodes which share a configuration profile.
#[derive(Clone, CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    derive = "Default",
    derive = "PartialEq",
    group = "machineconfiguration.openshift.io",
    kind = "MachineConfigPool",
    plural = "machineconfigpools",
    shortname = "mcp",
    singular = "machineconfigpool",
    version = "v1"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_config_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,
}

/// A `KubeletConfig` carries low-level kubelet settings for the pools its selector matches.
#[derive(Clone, CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    derive = "Default",
    derive = "PartialEq",
    group = "machineconfiguration.openshift.io",
    kind = "KubeletConfig",
    plural = "kubeletconfigs",
    singular = "kubeletconfig",
    version = "v1"
)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfigSpec {
    /// Selects the `MachineConfigPool`s, by their labels, which this configuration applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_config_pool_selector: Option<LabelSelector>,
    /// The embedded kubelet configuration, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet_config: Option<RawExtension>,
}

impl MachineConfigPool {
    pub fn with_labels(
        name: &str,
        labels: BTreeMap<String, String>,
        machine_config_selector: Option<LabelSelector>,
        node_selector: Option<LabelSelector>,
    ) -> Self {
        let mut pool = MachineConfigPool::new(
            name,
            MachineConfigPoolSpec {
                machine_config_selector,
                node_selector,
            },
        );
        pool.metadata.labels = Some(labels);
        pool
    }
}

impl KubeletConfig {
    pub fn with_payload(
        name: &str,
        labels: BTreeMap<String, String>,
        machine_config_pool_selector: Option<LabelSelector>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        let mut kubelet_config = KubeletConfig::new(
            name,
            KubeletConfigSpec {
                machine_config_pool_selector,
                kubelet_config: payload.map(RawExtension),
            },
        );
        kubelet_config.metadata.labels = Some(labels);
        kubelet_config
    }

    /// Decodes the embedded kubelet configuration.
    pub fn kubelet_configuration(&self) -> Result<KubeletConfiguration, KubeletConfigError> {
        KubeletConfiguration::from_raw(self.spec.kubelet_config.as_ref(), &self.name_any())
    }
}

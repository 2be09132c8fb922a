//! The subset of the kubelet configuration payload which the controller reads.
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;

/// Kubelet settings embedded in a `KubeletConfig` object. Fields the controller does not consume are ignored when
/// decoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_manager_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_manager_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserved_memory: Vec<MemoryReservation>,
}

/// Memory reserved for system daemons on a single NUMA node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReservation {
    pub numa_node: i32,
    #[serde(default)]
    pub limits: BTreeMap<String, Quantity>,
}

impl KubeletConfiguration {
    /// Decodes the raw payload of a `KubeletConfig` object.
    pub fn from_raw(raw: Option<&RawExtension>, name: &str) -> Result<Self> {
        let raw = raw.context(error::MissingKubeletConfigSnafu { name })?;
        serde_json::from_value(raw.0.clone()).context(error::DecodeKubeletConfigSnafu { name })
    }

    pub fn topology_manager_policy(&self) -> &str {
        self.topology_manager_policy.as_deref().unwrap_or_default()
    }

    pub fn topology_manager_scope(&self) -> &str {
        self.topology_manager_scope.as_deref().unwrap_or_default()
    }
}

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum KubeletConfigError {
        #[snafu(display("KubeletConfig '{}' does not carry a kubelet configuration payload", name))]
        MissingKubeletConfig { name: String },

        #[snafu(display("Unable to decode kubelet configuration of '{}': '{}'", name, source))]
        DecodeKubeletConfig {
            name: String,
            source: serde_json::Error,
        },
    }
}

pub use error::KubeletConfigError;
type Result<T> = std::result::Result<T, KubeletConfigError>;

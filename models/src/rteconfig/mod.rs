//! The configuration consumed by the node-local resource topology exporter (RTE), and the ConfigMap which
//! publishes it.
mod configmap;
mod error;

pub use self::configmap::{create_config_map, unpack_config_map};
pub use self::error::{Error, Result};

use crate::kubelet::KubeletConfiguration;
use crate::quantity::quantity_as_i64;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{event, Level};

const MEMORY_RESOURCE: &str = "memory";

/// Node-local agent settings derived from a kubelet configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_list: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topology_manager_policy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topology_manager_scope: String,
    /// `namespace -> name` of pods the agent does not account for. Absent rather than empty when there are none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_excludes: Option<BTreeMap<String, String>>,
}

/// Serializes the RTE configuration for the given topology manager settings.
pub fn render(policy: &str, scope: &str, pod_excludes: &BTreeMap<String, String>) -> Result<String> {
    render_over(&Config::default(), policy, scope, pod_excludes)
}

/// Like `render`, but keeps the `excludeList` of a base configuration.
///
/// The topology manager settings always come from the kubelet. A base configuration setting different ones is
/// overridden with a warning.
pub fn render_over(
    base: &Config,
    policy: &str,
    scope: &str,
    pod_excludes: &BTreeMap<String, String>,
) -> Result<String> {
    for (field, configured, rendered) in [
        ("topologyManagerPolicy", base.topology_manager_policy.as_str(), policy),
        ("topologyManagerScope", base.topology_manager_scope.as_str(), scope),
    ] {
        if !configured.is_empty() && configured != rendered {
            event!(
                Level::WARN,
                field,
                configured,
                rendered,
                "Base RTE configuration setting is overridden by the KubeletConfig."
            );
        }
    }

    let config = Config {
        exclude_list: base.exclude_list.clone().filter(|list| !list.is_empty()),
        topology_manager_policy: policy.to_string(),
        topology_manager_scope: scope.to_string(),
        pod_excludes: (!pod_excludes.is_empty()).then(|| pod_excludes.clone()),
    };
    serde_yaml::to_string(&config).context(error::SerializeSnafu)
}

pub fn unrender(data: &str) -> Result<Config> {
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(data).context(error::ParseSnafu)
}

/// Loads the operator-supplied base configuration.
///
/// A missing file yields the default configuration; a file which cannot be read or parsed is an error.
pub fn read_file(path: &Path) -> Result<Config> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            event!(
                Level::WARN,
                path = %path.display(),
                "RTE configuration file not found, using defaults."
            );
            return Ok(Config::default());
        }
        Err(err) => return Err(err).context(error::ReadConfigFileSnafu { path }),
    };

    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&data).context(error::ParseConfigFileSnafu { path })
}

/// Returns the memory, in bytes, reserved on each NUMA node by the kubelet.
///
/// Only the `memory` resource is considered. Reservations which are not an exact number of bytes are skipped, and a
/// later entry for the same NUMA node replaces an earlier one.
pub fn extract_memory_reservations(conf: &KubeletConfiguration) -> BTreeMap<i32, i64> {
    let mut reservations = BTreeMap::new();
    for reservation in &conf.reserved_memory {
        for (resource, quantity) in &reservation.limits {
            if resource != MEMORY_RESOURCE {
                continue;
            }
            match quantity_as_i64(quantity) {
                Some(bytes) => {
                    reservations.insert(reservation.numa_node, bytes);
                }
                None => {
                    event!(
                        Level::DEBUG,
                        numa_node = reservation.numa_node,
                        quantity = %quantity.0,
                        "Skipping memory reservation which is not an exact byte count."
                    );
                }
            }
        }
    }
    reservations
}

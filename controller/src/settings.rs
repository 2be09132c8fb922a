use models::constants::{DEFAULT_DECLARATION_NAME, DEFAULT_NAMESPACE};

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{event, Level};

const NAMESPACE_ENV_VAR: &str = "NROP_NAMESPACE";
const DECLARATION_NAME_ENV_VAR: &str = "NROP_DECLARATION_NAME";
const RETRY_PERIOD_ENV_VAR: &str = "NROP_KUBELETCONFIG_RETRY_PERIOD";
const RTE_CONFIG_FILE_ENV_VAR: &str = "NROP_RTE_CONFIG_FILE";

pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(30);

/// Settings for the KubeletConfig reconciler, fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Namespace in which RTE configuration ConfigMaps are published.
    pub namespace: String,
    /// Name of the NUMAResourcesOperator declaration to wait for.
    pub declaration_name: String,
    /// How long to wait before checking again for a declaration which does not exist yet.
    pub retry_period: Duration,
    pub base_config_path: Option<PathBuf>,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        ReconcilerSettings {
            namespace: DEFAULT_NAMESPACE.to_string(),
            declaration_name: DEFAULT_DECLARATION_NAME.to_string(),
            retry_period: DEFAULT_RETRY_PERIOD,
            base_config_path: None,
        }
    }
}

impl ReconcilerSettings {
    /// Reads the settings from the environment. `fallback_namespace` is used when no namespace is configured
    /// explicitly, typically the namespace the controller runs in.
    pub fn from_env(fallback_namespace: Option<&str>) -> Self {
        let namespace = env::var(NAMESPACE_ENV_VAR)
            .ok()
            .filter(|namespace| !namespace.is_empty())
            .or_else(|| fallback_namespace.map(String::from))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let declaration_name = env::var(DECLARATION_NAME_ENV_VAR)
            .ok()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_DECLARATION_NAME.to_string());

        ReconcilerSettings {
            namespace,
            declaration_name,
            retry_period: parse_retry_period(env::var(RETRY_PERIOD_ENV_VAR).ok().as_deref()),
            base_config_path: env::var_os(RTE_CONFIG_FILE_ENV_VAR).map(PathBuf::from),
        }
    }
}

/// Parses a retry period given in whole seconds. Invalid values are logged and replaced with the default.
pub(crate) fn parse_retry_period(value: Option<&str>) -> Duration {
    let value = match value {
        Some(value) => value,
        None => return DEFAULT_RETRY_PERIOD,
    };
    match value.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Duration::from_secs(seconds),
        _ => {
            event!(
                Level::ERROR,
                variable = RETRY_PERIOD_ENV_VAR,
                value,
                default = ?DEFAULT_RETRY_PERIOD,
                "Invalid retry period, using the default."
            );
            DEFAULT_RETRY_PERIOD
        }
    }
}

use models::{client, kubelet::KubeletConfigError, rteconfig};

use snafu::Snafu;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to fetch KubeletConfig '{}': '{}'", name, source))]
    FetchKubeletConfig { name: String, source: client::Error },

    #[snafu(display("Unable to list MachineConfigPools: '{}'", source))]
    ListMachineConfigPools { source: client::Error },

    #[snafu(display("Unable to fetch NUMAResourcesOperator '{}': '{}'", name, source))]
    FetchDeclaration { name: String, source: client::Error },

    #[snafu(display("Unable to decode the payload of KubeletConfig '{}': '{}'", name, source))]
    DecodeKubeletConfig {
        name: String,
        source: KubeletConfigError,
    },

    #[snafu(display("Unable to render RTE configuration from KubeletConfig '{}': '{}'", name, source))]
    RenderConfig {
        name: String,
        source: rteconfig::Error,
    },

    #[snafu(display("Unable to publish ConfigMap '{}/{}': '{}'", namespace, name, source))]
    UpsertConfigMap {
        namespace: String,
        name: String,
        source: client::Error,
    },
}

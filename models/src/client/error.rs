use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to get KubeletConfig '{}': '{}'", name, source))]
    GetKubeletConfig { name: String, source: kube::Error },

    #[snafu(display("Unable to get NUMAResourcesOperator '{}': '{}'", name, source))]
    GetNUMAResourcesOperator { name: String, source: kube::Error },

    #[snafu(display("Unable to list MachineConfigPools: '{}'", source))]
    ListMachineConfigPools { source: kube::Error },

    #[snafu(display("Unable to get ConfigMap '{}/{}': '{}'", namespace, name, source))]
    GetConfigMap {
        namespace: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to create ConfigMap '{}/{}': '{}'", namespace, name, source))]
    CreateConfigMap {
        namespace: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to replace ConfigMap '{}/{}': '{}'", namespace, name, source))]
    ReplaceConfigMap {
        namespace: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Existing ConfigMap '{}/{}' is malformed: '{}'", namespace, name, source))]
    MalformedConfigMap {
        namespace: String,
        name: String,
        source: crate::rteconfig::Error,
    },

    #[snafu(display("ConfigMap to upsert has no namespace"))]
    MissingNamespace {},
}

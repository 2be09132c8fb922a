//! Access to the cluster objects the controller reads and the ConfigMaps it publishes.
mod error;

pub use self::error::{Error, Result};

use crate::machineconfig::{KubeletConfig, MachineConfigPool};
use crate::operator::NUMAResourcesOperator;
use crate::rteconfig;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ListParams, PostParams};
use kube::ResourceExt;
use snafu::{OptionExt, ResultExt};
use std::sync::Arc;
use tracing::{event, instrument, Level};

#[cfg(feature = "mockall")]
use mockall::mock;

#[async_trait]
/// A trait providing an interface to the cluster objects involved in publishing RTE configuration. This is provided
/// as a trait in order to allow mocks to be used for testing purposes.
pub trait ClusterClient: Send + Sync {
    /// Fetch a KubeletConfig, or `None` if it does not exist.
    async fn get_kubelet_config(&self, name: &str) -> Result<Option<KubeletConfig>>;
    /// Fetch the NUMAResourcesOperator declaration, or `None` if it has not been created yet.
    async fn get_declaration(&self, name: &str) -> Result<Option<NUMAResourcesOperator>>;
    async fn list_machine_config_pools(&self) -> Result<Vec<MachineConfigPool>>;
    /// Create the ConfigMap if it is absent, otherwise overwrite it in place.
    async fn upsert_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;
}

#[cfg(feature = "mockall")]
mock! {
    /// A Mock ClusterClient for use in tests.
    pub ClusterClient {}
    #[async_trait]
    impl ClusterClient for ClusterClient {
        async fn get_kubelet_config(&self, name: &str) -> Result<Option<KubeletConfig>>;
        async fn get_declaration(&self, name: &str) -> Result<Option<NUMAResourcesOperator>>;
        async fn list_machine_config_pools(&self) -> Result<Vec<MachineConfigPool>>;
        async fn upsert_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;
    }
}

#[async_trait]
impl<T> ClusterClient for Arc<T>
where
    T: ClusterClient,
{
    async fn get_kubelet_config(&self, name: &str) -> Result<Option<KubeletConfig>> {
        (**self).get_kubelet_config(name).await
    }

    async fn get_declaration(&self, name: &str) -> Result<Option<NUMAResourcesOperator>> {
        (**self).get_declaration(name).await
    }

    async fn list_machine_config_pools(&self) -> Result<Vec<MachineConfigPool>> {
        (**self).list_machine_config_pools().await
    }

    async fn upsert_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        (**self).upsert_config_map(config_map).await
    }
}

/// How an upsert has to be carried out, given the ConfigMap currently stored in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertPlan {
    Create,
    /// The stored ConfigMap already carries the desired content.
    Unchanged,
    /// Overwrite the stored ConfigMap, guarded by its resource version.
    Replace(Option<String>),
}

/// Decides how to upsert `desired` over `existing`. An existing ConfigMap which does not carry an RTE configuration
/// is rejected rather than overwritten.
pub fn plan_upsert(existing: Option<&ConfigMap>, desired: &ConfigMap) -> rteconfig::Result<UpsertPlan> {
    let existing = match existing {
        None => return Ok(UpsertPlan::Create),
        Some(existing) => existing,
    };
    let current = rteconfig::unpack_config_map(Some(existing))?;
    let wanted = rteconfig::unpack_config_map(Some(desired))?;

    if current == wanted && existing.metadata.owner_references == desired.metadata.owner_references {
        Ok(UpsertPlan::Unchanged)
    } else {
        Ok(UpsertPlan::Replace(existing.resource_version()))
    }
}

#[derive(Clone)]
/// Concrete implementation of the `ClusterClient` trait. This implementation will almost certainly be used in any
/// case that isn't a unit test.
pub struct K8SClusterClient {
    k8s_client: kube::client::Client,
}

impl K8SClusterClient {
    pub fn new(k8s_client: kube::client::Client) -> Self {
        K8SClusterClient { k8s_client }
    }
}

#[async_trait]
impl ClusterClient for K8SClusterClient {
    #[instrument(skip(self), err)]
    async fn get_kubelet_config(&self, name: &str) -> Result<Option<KubeletConfig>> {
        let api: Api<KubeletConfig> = Api::all(self.k8s_client.clone());
        api.get_opt(name)
            .await
            .context(error::GetKubeletConfigSnafu { name })
    }

    #[instrument(skip(self), err)]
    async fn get_declaration(&self, name: &str) -> Result<Option<NUMAResourcesOperator>> {
        let api: Api<NUMAResourcesOperator> = Api::all(self.k8s_client.clone());
        api.get_opt(name)
            .await
            .context(error::GetNUMAResourcesOperatorSnafu { name })
    }

    #[instrument(skip(self), err)]
    async fn list_machine_config_pools(&self) -> Result<Vec<MachineConfigPool>> {
        let api: Api<MachineConfigPool> = Api::all(self.k8s_client.clone());
        let pools = api
            .list(&ListParams::default())
            .await
            .context(error::ListMachineConfigPoolsSnafu)?;
        Ok(pools.items)
    }

    #[instrument(skip(self, config_map), fields(name = %config_map.name_any()), err)]
    async fn upsert_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let namespace = config_map
            .namespace()
            .context(error::MissingNamespaceSnafu)?;
        let name = config_map.name_any();
        let api: Api<ConfigMap> = Api::namespaced(self.k8s_client.clone(), &namespace);

        let existing = api
            .get_opt(&name)
            .await
            .context(error::GetConfigMapSnafu {
                namespace: &namespace,
                name: &name,
            })?;

        let plan = plan_upsert(existing.as_ref(), config_map).context(
            error::MalformedConfigMapSnafu {
                namespace: &namespace,
                name: &name,
            },
        )?;

        match (plan, existing) {
            (UpsertPlan::Unchanged, Some(existing)) => {
                event!(Level::DEBUG, %namespace, %name, "ConfigMap is up to date.");
                Ok(existing)
            }
            (UpsertPlan::Replace(resource_version), _) => {
                let mut updated = config_map.clone();
                updated.metadata.resource_version = resource_version;
                event!(Level::INFO, %namespace, %name, "Updating ConfigMap.");
                api.replace(&name, &PostParams::default(), &updated)
                    .await
                    .context(error::ReplaceConfigMapSnafu {
                        namespace: &namespace,
                        name: &name,
                    })
            }
            _ => {
                event!(Level::INFO, %namespace, %name, "Creating ConfigMap.");
                api.create(&PostParams::default(), config_map)
                    .await
                    .context(error::CreateConfigMapSnafu {
                        namespace: &namespace,
                        name: &name,
                    })
            }
        }
    }
}

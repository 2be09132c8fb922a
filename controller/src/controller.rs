use super::{
    error::{Error, Result},
    metrics::ReconcileMetrics,
    reconciler::KubeletConfigReconciler,
};
use models::client::ClusterClient;
use models::events::EventRecorder;
use models::machineconfig::KubeletConfig;

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::{Resource, ResourceExt};
use kube::runtime::{
    controller::{Action, Controller},
    reflector::ObjectRef,
    watcher,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, Level};

// Requeue delay after a failed reconciliation.
const ERROR_REQUEUE_PERIOD: Duration = Duration::from_secs(10);

/// State shared by every reconciliation run by the controller.
pub struct Context<C: ClusterClient, R: EventRecorder> {
    reconciler: KubeletConfigReconciler<C, R>,
    metrics: ReconcileMetrics,
}

impl<C: ClusterClient, R: EventRecorder> Context<C, R> {
    pub fn new(reconciler: KubeletConfigReconciler<C, R>, metrics: ReconcileMetrics) -> Self {
        Context {
            reconciler,
            metrics,
        }
    }
}

/// Drives a `KubeletConfigReconciler` from watch events on KubeletConfigs and the ConfigMaps published for them.
pub struct KubeletConfigController<C: ClusterClient, R: EventRecorder> {
    k8s_client: kube::client::Client,
    context: Arc<Context<C, R>>,
}

impl<C, R> KubeletConfigController<C, R>
where
    C: ClusterClient + 'static,
    R: EventRecorder + 'static,
{
    pub fn new(k8s_client: kube::client::Client, context: Context<C, R>) -> Self {
        KubeletConfigController {
            k8s_client,
            context: Arc::new(context),
        }
    }

    /// Runs the controller until the process receives a termination signal.
    pub async fn run(self) {
        let kubelet_configs: Api<KubeletConfig> = Api::all(self.k8s_client.clone());
        let config_maps: Api<ConfigMap> = Api::namespaced(
            self.k8s_client.clone(),
            &self.context.reconciler.settings().namespace,
        );

        Controller::new(kubelet_configs, watcher::Config::default())
            .watches(config_maps, watcher::Config::default(), kubelet_config_owners)
            .shutdown_on_signal()
            .run(reconcile::<C, R>, error_policy::<C, R>, self.context)
            .for_each(|result| async move {
                match result {
                    Ok((kubelet_config, action)) => event!(
                        Level::DEBUG,
                        %kubelet_config,
                        ?action,
                        "Reconciled KubeletConfig."
                    ),
                    Err(err) => event!(Level::WARN, %err, "KubeletConfig reconciliation failed."),
                }
            })
            .await;

        event!(Level::INFO, "KubeletConfig controller stopped.");
    }
}

async fn reconcile<C, R>(kubelet_config: Arc<KubeletConfig>, context: Arc<Context<C, R>>) -> Result<Action>
where
    C: ClusterClient + 'static,
    R: EventRecorder + 'static,
{
    let request = ObjectRef::from_obj(kubelet_config.as_ref());
    match context.reconciler.reconcile(&request).await {
        Ok(outcome) => {
            if let Some(reason) = outcome.reason() {
                context.metrics.record_outcome(reason);
            }
            Ok(outcome
                .requeue_after()
                .map_or_else(Action::await_change, Action::requeue))
        }
        Err(err) => {
            context.metrics.record_failure();
            Err(err)
        }
    }
}

/// Maps a ConfigMap to the KubeletConfigs owning it. KubeletConfigs are cluster scoped, so the references carry no
/// namespace even though the ConfigMap has one.
fn kubelet_config_owners(config_map: ConfigMap) -> Vec<ObjectRef<KubeletConfig>> {
    config_map
        .owner_references()
        .iter()
        .filter(|owner| {
            owner.kind == KubeletConfig::kind(&()) && owner.api_version == KubeletConfig::api_version(&())
        })
        .map(|owner| ObjectRef::new(&owner.name))
        .collect()
}

fn error_policy<C, R>(_kubelet_config: Arc<KubeletConfig>, _err: &Error, _context: Arc<Context<C, R>>) -> Action
where
    C: ClusterClient,
    R: EventRecorder,
{
    Action::requeue(ERROR_REQUEUE_PERIOD)
}

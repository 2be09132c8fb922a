use super::{
    error::{self, Result},
    resolver,
    settings::ReconcilerSettings,
};
use models::client::ClusterClient;
use models::constants::{
    REASON_PROCESS_FAILED, REASON_PROCESS_OK, REASON_PROCESS_SKIP, REASON_WAITING,
};
use models::events::{EventRecorder, EventSeverity};
use models::machineconfig::{KubeletConfig, MachineConfigPool};
use models::operator::component_name;
use models::rteconfig;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use snafu::ResultExt;
use std::time::Duration;
use tracing::{event, instrument, Level};

/// The result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The KubeletConfig no longer exists.
    Absent,
    /// The NUMAResourcesOperator declaration does not exist yet. Check again after the given period.
    Waiting(Duration),
    /// No node group of the declaration covers a pool the KubeletConfig applies to.
    Skipped,
    /// RTE configuration was published to the listed `namespace/name` ConfigMaps.
    Published(Vec<String>),
}

impl ReconcileOutcome {
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            ReconcileOutcome::Waiting(period) => Some(*period),
            _ => None,
        }
    }

    /// The label under which this outcome is counted, if it is counted at all.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            ReconcileOutcome::Absent => None,
            ReconcileOutcome::Waiting(_) => Some(REASON_WAITING),
            ReconcileOutcome::Skipped => Some(REASON_PROCESS_SKIP),
            ReconcileOutcome::Published(_) => Some(REASON_PROCESS_OK),
        }
    }
}

/// Publishes the RTE configuration derived from a KubeletConfig for every pool covered by the
/// NUMAResourcesOperator declaration.
pub struct KubeletConfigReconciler<C: ClusterClient, R: EventRecorder> {
    client: C,
    recorder: R,
    settings: ReconcilerSettings,
    base_config: rteconfig::Config,
}

impl<C: ClusterClient, R: EventRecorder> KubeletConfigReconciler<C, R> {
    pub fn new(
        client: C,
        recorder: R,
        settings: ReconcilerSettings,
        base_config: rteconfig::Config,
    ) -> Self {
        KubeletConfigReconciler {
            client,
            recorder,
            settings,
            base_config,
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Reconciles the KubeletConfig named by `request`.
    ///
    /// Any failure is recorded as a `ProcessFailed` event, against the declaration once it is known and against the
    /// KubeletConfig before that, and then returned unchanged.
    #[instrument(skip(self, request), fields(kubelet_config = %request.name), err)]
    pub async fn reconcile(&self, request: &ObjectRef<KubeletConfig>) -> Result<ReconcileOutcome> {
        let mut involved: ObjectReference = request.clone().into();
        match self.reconcile_kubelet_config(request, &mut involved).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.record(
                    &involved,
                    EventSeverity::Warning,
                    REASON_PROCESS_FAILED,
                    &format!("Failed to update RTE config: {}", err),
                )
                .await;
                Err(err)
            }
        }
    }

    async fn reconcile_kubelet_config(
        &self,
        request: &ObjectRef<KubeletConfig>,
        involved: &mut ObjectReference,
    ) -> Result<ReconcileOutcome> {
        let kc_name = request.name.as_str();
        let kubelet_config = match self
            .client
            .get_kubelet_config(kc_name)
            .await
            .context(error::FetchKubeletConfigSnafu { name: kc_name })?
        {
            Some(kubelet_config) => kubelet_config,
            None => {
                event!(Level::DEBUG, "KubeletConfig no longer exists.");
                return Ok(ReconcileOutcome::Absent);
            }
        };
        *involved = kubelet_config.object_ref(&());

        let pools = self
            .client
            .list_machine_config_pools()
            .await
            .context(error::ListMachineConfigPoolsSnafu)?;
        let matched_pools = resolver::pools_for_kubelet_config(&kubelet_config, &pools);
        event!(
            Level::DEBUG,
            pools = ?matched_pools.iter().map(|pool| pool.name_any()).collect::<Vec<_>>(),
            "Matched MachineConfigPools."
        );

        let declaration_name = self.settings.declaration_name.as_str();
        let declaration = match self
            .client
            .get_declaration(declaration_name)
            .await
            .context(error::FetchDeclarationSnafu {
                name: declaration_name,
            })? {
            Some(declaration) => declaration,
            None => {
                event!(
                    Level::INFO,
                    declaration = declaration_name,
                    retry_period = ?self.settings.retry_period,
                    "NUMAResourcesOperator not found, waiting for it to be created."
                );
                return Ok(ReconcileOutcome::Waiting(self.settings.retry_period));
            }
        };
        *involved = declaration.object_ref(&());

        let target_pools: Vec<&MachineConfigPool> = matched_pools
            .into_iter()
            .filter(|pool| resolver::resolve(Some(&declaration), pool).is_some())
            .collect();
        if target_pools.is_empty() {
            let message = format!(
                "No node group of '{}' covers the pools of KubeletConfig '{}'",
                declaration.name_any(),
                kc_name
            );
            event!(Level::INFO, "{}", message);
            self.record(involved, EventSeverity::Normal, REASON_PROCESS_SKIP, &message)
                .await;
            return Ok(ReconcileOutcome::Skipped);
        }

        let kubelet_configuration = kubelet_config
            .kubelet_configuration()
            .context(error::DecodeKubeletConfigSnafu { name: kc_name })?;
        let memory_reservations = rteconfig::extract_memory_reservations(&kubelet_configuration);
        event!(
            Level::DEBUG,
            ?memory_reservations,
            "Memory reserved per NUMA node."
        );

        let mut pod_excludes = self.base_config.pod_excludes.clone().unwrap_or_default();
        pod_excludes.extend(declaration.pod_excludes());
        let data = rteconfig::render_over(
            &self.base_config,
            kubelet_configuration.topology_manager_policy(),
            kubelet_configuration.topology_manager_scope(),
            &pod_excludes,
        )
        .context(error::RenderConfigSnafu { name: kc_name })?;

        let namespace = self.settings.namespace.as_str();
        let mut published = Vec::with_capacity(target_pools.len());
        for pool in target_pools {
            let name = component_name(&declaration.name_any(), &pool.name_any());
            let mut config_map = rteconfig::create_config_map(namespace, &name, &data);
            config_map.metadata.owner_references = kubelet_config
                .controller_owner_ref(&())
                .map(|owner| vec![owner]);

            self.client
                .upsert_config_map(&config_map)
                .await
                .context(error::UpsertConfigMapSnafu {
                    namespace,
                    name: &name,
                })?;
            event!(Level::INFO, %namespace, %name, pool = %pool.name_any(), "Published RTE configuration.");
            published.push(format!("{}/{}", namespace, name));
        }

        self.record(
            involved,
            EventSeverity::Normal,
            REASON_PROCESS_OK,
            &format!(
                "Updated RTE config {} from KubeletConfig {}",
                published.join(", "),
                kc_name
            ),
        )
        .await;

        Ok(ReconcileOutcome::Published(published))
    }

    /// Publishes an event. Failing to do so does not fail the reconciliation.
    async fn record(
        &self,
        reference: &ObjectReference,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) {
        if let Err(err) = self
            .recorder
            .record(reference, severity, reason, message)
            .await
        {
            event!(Level::WARN, %err, reason, "Unable to record event.");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use maplit::btreemap;
    use models::client::{Error as ClientError, MockClusterClient};
    use models::events::{EventError, MockEventRecorder};
    use models::operator::{NUMAResourcesOperator, NamespacedName};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    fn api_error() -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "the server is currently unable to handle the request".to_string(),
            reason: "ServiceUnavailable".to_string(),
            code: 503,
        })
    }

    fn test_selector() -> LabelSelector {
        LabelSelector {
            match_labels: Some(btreemap! { "test1".to_string() => "test1".to_string() }),
            ..Default::default()
        }
    }

    fn kubelet_config(payload: Option<serde_json::Value>) -> KubeletConfig {
        let mut kc = KubeletConfig::with_payload(
            "test1",
            btreemap! { "test1".to_string() => "test1".to_string() },
            Some(test_selector()),
            payload,
        );
        kc.metadata.uid = Some("5f2e8c1a-test1".to_string());
        kc
    }

    fn valid_payload() -> Option<serde_json::Value> {
        Some(json!({
            "topologyManagerPolicy": "single-numa-node",
            "topologyManagerScope": "pod",
            "reservedMemory": [{"numaNode": 0, "limits": {"memory": "1100Mi"}}]
        }))
    }

    fn pools() -> Vec<MachineConfigPool> {
        vec![
            MachineConfigPool::with_labels(
                "test1",
                btreemap! { "test1".to_string() => "test1".to_string() },
                None,
                None,
            ),
            MachineConfigPool::with_labels(
                "master",
                btreemap! { "master".to_string() => "".to_string() },
                None,
                None,
            ),
        ]
    }

    fn declaration() -> NUMAResourcesOperator {
        NUMAResourcesOperator::with_selectors("numaresourcesoperator", vec![test_selector()])
    }

    /// A cluster holding the given objects. Upserted ConfigMaps are appended to the returned store.
    fn cluster(
        kubelet_config: Option<KubeletConfig>,
        declaration: Option<NUMAResourcesOperator>,
    ) -> (MockClusterClient, Arc<Mutex<Vec<ConfigMap>>>) {
        let store = Arc::new(Mutex::new(Vec::new()));
        let mut client = MockClusterClient::new();
        client
            .expect_get_kubelet_config()
            .returning(move |_| Ok(kubelet_config.clone()));
        client
            .expect_list_machine_config_pools()
            .returning(|| Ok(pools()));
        client
            .expect_get_declaration()
            .withf(|name: &str| name == "numaresourcesoperator")
            .returning(move |_| Ok(declaration.clone()));

        let upserted = Arc::clone(&store);
        client
            .expect_upsert_config_map()
            .returning(move |config_map| {
                upserted.lock().unwrap().push(config_map.clone());
                Ok(config_map.clone())
            });
        (client, store)
    }

    fn expect_event(recorder: &mut MockEventRecorder, expected_reason: &'static str, times: usize) {
        recorder
            .expect_record()
            .withf(move |_, _, reason: &str, _| reason == expected_reason)
            .times(times)
            .returning(|_, _, _, _| Ok(()));
    }

    fn reconciler(
        client: MockClusterClient,
        recorder: MockEventRecorder,
    ) -> KubeletConfigReconciler<MockClusterClient, MockEventRecorder> {
        KubeletConfigReconciler::new(
            client,
            recorder,
            ReconcilerSettings::default(),
            rteconfig::Config::default(),
        )
    }

    fn request() -> ObjectRef<KubeletConfig> {
        ObjectRef::new("test1")
    }

    #[tokio::test]
    async fn test_waits_for_declaration() {
        let (client, store) = cluster(Some(kubelet_config(valid_payload())), None);
        let recorder = MockEventRecorder::new();

        let outcome = reconciler(client, recorder).reconcile(&request()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Waiting(Duration::from_secs(30)));
        assert_eq!(outcome.requeue_after(), Some(Duration::from_secs(30)));
        assert!(store.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publishes_rte_config() {
        let (client, store) = cluster(Some(kubelet_config(valid_payload())), Some(declaration()));
        let mut recorder = MockEventRecorder::new();
        recorder
            .expect_record()
            .withf(|reference, severity, reason: &str, message: &str| {
                reference.kind.as_deref() == Some("NUMAResourcesOperator")
                    && *severity == EventSeverity::Normal
                    && reason == "ProcessOK"
                    && message.contains("numaresources/numaresourcesoperator-test1")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let outcome = reconciler(client, recorder).reconcile(&request()).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Published(vec![
                "numaresources/numaresourcesoperator-test1".to_string()
            ])
        );
        assert_eq!(outcome.requeue_after(), None);

        let store = store.lock().unwrap();
        assert_eq!(store.len(), 1);
        let config_map = &store[0];
        assert_eq!(config_map.name_any(), "numaresourcesoperator-test1");
        assert_eq!(config_map.namespace().as_deref(), Some("numaresources"));

        let owner = &config_map.owner_references()[0];
        assert_eq!(owner.kind, "KubeletConfig");
        assert_eq!(owner.name, "test1");
        assert_eq!(owner.controller, Some(true));

        let config = rteconfig::unrender(rteconfig::unpack_config_map(Some(config_map)).unwrap())
            .unwrap();
        assert_eq!(config.topology_manager_policy, "single-numa-node");
        assert_eq!(config.topology_manager_scope, "pod");
        assert_eq!(config.pod_excludes, None);
    }

    #[tokio::test]
    async fn test_base_config_is_merged() {
        let mut declaration = declaration();
        declaration.spec.pod_excludes = Some(vec![NamespacedName {
            namespace: "kube-system".to_string(),
            name: "kube-proxy-*".to_string(),
        }]);
        let (client, store) = cluster(Some(kubelet_config(valid_payload())), Some(declaration));
        let mut recorder = MockEventRecorder::new();
        expect_event(&mut recorder, "ProcessOK", 1);

        let base_config = rteconfig::Config {
            exclude_list: Some(btreemap! {
                "*".to_string() => vec!["hugepages-1Gi".to_string()],
            }),
            topology_manager_policy: "none".to_string(),
            pod_excludes: Some(btreemap! {
                "kube-system".to_string() => "*".to_string(),
                "openshift-dns".to_string() => "dns-*".to_string(),
            }),
            ..Default::default()
        };
        let reconciler = KubeletConfigReconciler::new(
            client,
            recorder,
            ReconcilerSettings::default(),
            base_config,
        );
        reconciler.reconcile(&request()).await.unwrap();

        let store = store.lock().unwrap();
        let config = rteconfig::unrender(rteconfig::unpack_config_map(Some(&store[0])).unwrap())
            .unwrap();
        assert_eq!(
            config.pod_excludes,
            Some(btreemap! {
                "kube-system".to_string() => "kube-proxy-*".to_string(),
                "openshift-dns".to_string() => "dns-*".to_string(),
            })
        );
        assert_eq!(
            config.exclude_list,
            Some(btreemap! { "*".to_string() => vec!["hugepages-1Gi".to_string()] })
        );
        assert_eq!(config.topology_manager_policy, "single-numa-node");
    }

    #[tokio::test]
    async fn test_publishes_for_every_covered_pool() {
        let zone = |zone: &str| LabelSelector {
            match_labels: Some(btreemap! { "zone".to_string() => zone.to_string() }),
            ..Default::default()
        };
        let pool = |name: &str| {
            MachineConfigPool::with_labels(
                name,
                btreemap! {
                    "numa".to_string() => "enabled".to_string(),
                    "zone".to_string() => name.to_string(),
                },
                None,
                None,
            )
        };
        let mut kubelet_config = KubeletConfig::with_payload(
            "test1",
            BTreeMap::new(),
            Some(LabelSelector {
                match_labels: Some(btreemap! { "numa".to_string() => "enabled".to_string() }),
                ..Default::default()
            }),
            valid_payload(),
        );
        kubelet_config.metadata.uid = Some("5f2e8c1a-test1".to_string());
        let declaration = NUMAResourcesOperator::with_selectors("nro", vec![zone("a"), zone("c")]);

        let store = Arc::new(Mutex::new(Vec::new()));
        let mut client = MockClusterClient::new();
        client
            .expect_get_kubelet_config()
            .returning(move |_| Ok(Some(kubelet_config.clone())));
        client
            .expect_list_machine_config_pools()
            .returning(move || Ok(vec![pool("a"), pool("b"), pool("c")]));
        client
            .expect_get_declaration()
            .returning(move |_| Ok(Some(declaration.clone())));
        let upserted = Arc::clone(&store);
        client
            .expect_upsert_config_map()
            .times(2)
            .returning(move |config_map| {
                upserted.lock().unwrap().push(config_map.clone());
                Ok(config_map.clone())
            });
        let mut recorder = MockEventRecorder::new();
        expect_event(&mut recorder, "ProcessOK", 1);

        let settings = ReconcilerSettings {
            declaration_name: "nro".to_string(),
            ..Default::default()
        };
        let reconciler =
            KubeletConfigReconciler::new(client, recorder, settings, rteconfig::Config::default());
        let outcome = reconciler.reconcile(&request()).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Published(vec![
                "numaresources/nro-a".to_string(),
                "numaresources/nro-c".to_string(),
            ])
        );
        let names: Vec<String> = store.lock().unwrap().iter().map(|cm| cm.name_any()).collect();
        assert_eq!(names, vec!["nro-a".to_string(), "nro-c".to_string()]);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let (client, store) = cluster(Some(kubelet_config(valid_payload())), Some(declaration()));
        let mut recorder = MockEventRecorder::new();
        expect_event(&mut recorder, "ProcessOK", 2);
        let reconciler = reconciler(client, recorder);

        let first = reconciler.reconcile(&request()).await.unwrap();
        let second = reconciler.reconcile(&request()).await.unwrap();

        assert_eq!(first, second);
        let store = store.lock().unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store[0], store[1]);
    }

    #[tokio::test]
    async fn test_undecodable_payload_fails() {
        for payload in [Some(json!(null)), Some(json!("")), None] {
            let (client, store) = cluster(Some(kubelet_config(payload)), Some(declaration()));
            let mut recorder = MockEventRecorder::new();
            recorder
                .expect_record()
                .withf(|_, severity, reason: &str, _| {
                    *severity == EventSeverity::Warning && reason == "ProcessFailed"
                })
                .times(1)
                .returning(|_, _, _, _| Ok(()));

            let result = reconciler(client, recorder).reconcile(&request()).await;

            assert!(matches!(result, Err(Error::DecodeKubeletConfig { .. })));
            assert!(store.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_absent_kubelet_config() {
        let (client, store) = cluster(None, Some(declaration()));
        let recorder = MockEventRecorder::new();

        let outcome = reconciler(client, recorder).reconcile(&request()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Absent);
        assert_eq!(outcome.requeue_after(), None);
        assert!(store.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skips_when_no_node_group_matches() {
        let declaration = NUMAResourcesOperator::with_selectors(
            "numaresourcesoperator",
            vec![LabelSelector {
                match_labels: Some(btreemap! { "cnf".to_string() => "".to_string() }),
                ..Default::default()
            }],
        );
        let (client, store) = cluster(Some(kubelet_config(valid_payload())), Some(declaration));
        let mut recorder = MockEventRecorder::new();
        recorder
            .expect_record()
            .withf(|_, severity, reason: &str, _| {
                *severity == EventSeverity::Normal && reason == "ProcessSkip"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let outcome = reconciler(client, recorder).reconcile(&request()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Skipped);
        assert!(store.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_kubelet_config()
            .returning(|_| Ok(Some(kubelet_config(valid_payload()))));
        client
            .expect_list_machine_config_pools()
            .returning(|| Ok(pools()));
        client
            .expect_get_declaration()
            .returning(|_| Ok(Some(declaration())));
        client.expect_upsert_config_map().returning(|config_map| {
            Err(ClientError::CreateConfigMap {
                namespace: config_map.namespace().unwrap_or_default(),
                name: config_map.name_any(),
                source: api_error(),
            })
        });
        let mut recorder = MockEventRecorder::new();
        expect_event(&mut recorder, "ProcessFailed", 1);

        let result = reconciler(client, recorder).reconcile(&request()).await;

        match result {
            Err(Error::UpsertConfigMap {
                namespace, name, ..
            }) => {
                assert_eq!(namespace, "numaresources");
                assert_eq!(name, "numaresourcesoperator-test1");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_is_reported_against_kubelet_config() {
        let mut client = MockClusterClient::new();
        client.expect_get_kubelet_config().returning(|name| {
            Err(ClientError::GetKubeletConfig {
                name: name.to_string(),
                source: api_error(),
            })
        });
        let mut recorder = MockEventRecorder::new();
        recorder
            .expect_record()
            .withf(|reference, _, reason: &str, _| {
                reference.kind.as_deref() == Some("KubeletConfig")
                    && reference.name.as_deref() == Some("test1")
                    && reason == "ProcessFailed"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let result = reconciler(client, recorder).reconcile(&request()).await;

        assert!(matches!(result, Err(Error::FetchKubeletConfig { .. })));
    }

    #[tokio::test]
    async fn test_event_failures_do_not_fail_reconciliation() {
        let (client, store) = cluster(Some(kubelet_config(valid_payload())), Some(declaration()));
        let mut recorder = MockEventRecorder::new();
        recorder.expect_record().times(1).returning(|_, _, reason, _| {
            Err(EventError::PublishEvent {
                reason: reason.to_string(),
                source: api_error(),
            })
        });

        let outcome = reconciler(client, recorder).reconcile(&request()).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Published(_)));
        assert_eq!(store.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_outcome_reasons() {
        assert_eq!(ReconcileOutcome::Absent.reason(), None);
        assert_eq!(
            ReconcileOutcome::Waiting(Duration::from_secs(1)).reason(),
            Some("Waiting")
        );
        assert_eq!(ReconcileOutcome::Skipped.reason(), Some("ProcessSkip"));
        assert_eq!(
            ReconcileOutcome::Published(vec![]).reason(),
            Some("ProcessOK")
        );
    }
}

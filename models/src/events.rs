//! Publishing Kubernetes events about reconciliation outcomes.
use crate::constants::CONTROLLER;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use snafu::ResultExt;
use std::sync::Arc;
use tracing::instrument;

#[cfg(feature = "mockall")]
use mockall::mock;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EventSeverity {
    Normal,
    Warning,
}

impl From<EventSeverity> for EventType {
    fn from(severity: EventSeverity) -> Self {
        match severity {
            EventSeverity::Normal => EventType::Normal,
            EventSeverity::Warning => EventType::Warning,
        }
    }
}

#[async_trait]
/// A trait for recording events against cluster objects, provided as a trait so that tests can observe which
/// events a reconciliation emits.
pub trait EventRecorder: Send + Sync {
    async fn record(
        &self,
        reference: &ObjectReference,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) -> Result<()>;
}

#[cfg(feature = "mockall")]
mock! {
    /// A Mock EventRecorder for use in tests.
    pub EventRecorder {}
    #[async_trait]
    impl EventRecorder for EventRecorder {
        async fn record(
            &self,
            reference: &ObjectReference,
            severity: EventSeverity,
            reason: &str,
            message: &str,
        ) -> Result<()>;
    }
}

#[async_trait]
impl<T> EventRecorder for Arc<T>
where
    T: EventRecorder,
{
    async fn record(
        &self,
        reference: &ObjectReference,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        (**self).record(reference, severity, reason, message).await
    }
}

#[derive(Clone)]
/// Records events through the Kubernetes events API on behalf of the controller.
pub struct K8SEventRecorder {
    k8s_client: kube::client::Client,
    reporter: Reporter,
}

impl K8SEventRecorder {
    pub fn new(k8s_client: kube::client::Client) -> Self {
        K8SEventRecorder {
            k8s_client,
            reporter: Reporter {
                controller: CONTROLLER.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventRecorder for K8SEventRecorder {
    #[instrument(skip(self, reference), fields(object = ?reference.name), err)]
    async fn record(
        &self,
        reference: &ObjectReference,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        let recorder = Recorder::new(
            self.k8s_client.clone(),
            self.reporter.clone(),
            reference.clone(),
        );
        recorder
            .publish(Event {
                type_: severity.into(),
                reason: reason.to_string(),
                note: Some(message.to_string()),
                action: "Reconcile".to_string(),
                secondary: None,
            })
            .await
            .context(error::PublishEventSnafu { reason })
    }
}

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum EventError {
        #[snafu(display("Unable to publish '{}' event: '{}'", reason, source))]
        PublishEvent { reason: String, source: kube::Error },
    }
}

pub use error::EventError;
type Result<T> = std::result::Result<T, EventError>;

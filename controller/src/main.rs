use std::env;

use controller::{
    telemetry::vending_metrics, Context, KubeletConfigController, KubeletConfigReconciler,
    ReconcileMetrics, ReconcilerSettings,
};
use models::{
    client::K8SClusterClient,
    constants::{CONTROLLER, CONTROLLER_INTERNAL_PORT},
    events::K8SEventRecorder,
    rteconfig, telemetry, version,
};

use actix_web::{web::Data, App, HttpServer};
use opentelemetry::global;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use snafu::ResultExt;
use tracing::{event, Level};

/// The module-wide result type.
type Result<T> = std::result::Result<T, controller_error::Error>;

#[actix_web::main]
async fn main() -> Result<()> {
    telemetry::init_telemetry_from_env().context(controller_error::TelemetryInitSnafu)?;
    event!(
        Level::INFO,
        program = %version::program_name(),
        version = version::get(),
        "Starting NUMA resources controller."
    );
    if version::undefined() {
        event!(Level::WARN, "Build version is undefined.");
    }

    let k8s_config = kube::Config::infer()
        .await
        .context(controller_error::ConfigCreateSnafu)?;

    // Publish into the namespace we run in unless told otherwise.
    let settings = ReconcilerSettings::from_env(Some(k8s_config.default_namespace.as_str()));
    event!(Level::INFO, ?settings, "Loaded reconciler settings.");

    let base_config = settings
        .base_config_path
        .as_deref()
        .map(rteconfig::read_file)
        .transpose()
        .context(controller_error::BaseConfigSnafu)?
        .unwrap_or_default();

    let k8s_client = kube::client::Client::try_from(k8s_config)
        .context(controller_error::ClientCreateSnafu)?;

    // The meter provider has to be installed before any instruments are created.
    let registry = prometheus::Registry::new();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()
        .context(controller_error::PrometheusExporterSnafu)?;
    global::set_meter_provider(SdkMeterProvider::builder().with_reader(exporter).build());
    let metrics = ReconcileMetrics::new(global::meter(CONTROLLER));

    let reconciler = KubeletConfigReconciler::new(
        K8SClusterClient::new(k8s_client.clone()),
        K8SEventRecorder::new(k8s_client.clone()),
        settings,
        base_config,
    );
    let controller = KubeletConfigController::new(k8s_client, Context::new(reconciler, metrics));
    let controller_runner = controller.run();

    let k8s_service_addr = env::var("KUBERNETES_SERVICE_HOST")
        .context(controller_error::MissingClusterIPFamilySnafu)?;
    let bindaddress = if k8s_service_addr.contains(':') {
        // IPv6 format
        "[::]"
    } else {
        // IPv4 format
        "0.0.0.0"
    };

    // Setup Http server to vend prometheus metrics
    let prometheus_server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(registry.clone()))
            .service(vending_metrics)
    })
    .bind(format!("{}:{}", bindaddress, CONTROLLER_INTERNAL_PORT))
    .context(controller_error::PrometheusServerSnafu)?
    .run();

    tokio::select! {
        _ = controller_runner => {
            event!(Level::INFO, "controller exited");
        },
        _ = prometheus_server => {
            event!(Level::ERROR, "metric server exited");
        }
    };
    Ok(())
}

pub mod controller_error {
    use models::{rteconfig, telemetry};
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum Error {
        #[snafu(display("Unable to create Kubernetes client config: '{}'", source))]
        ConfigCreate {
            source: kube::config::InferConfigError,
        },

        #[snafu(display("Unable to create Kubernetes client: '{}'", source))]
        ClientCreate { source: kube::Error },

        #[snafu(display("Unable to load the base RTE configuration: '{}'", source))]
        BaseConfig { source: rteconfig::Error },

        #[snafu(display("Error determining the cluster server address: '{}'", source))]
        MissingClusterIPFamily { source: std::env::VarError },

        #[snafu(display("Unable to create prometheus exporter: '{}'", source))]
        PrometheusExporter {
            source: opentelemetry::metrics::MetricsError,
        },

        #[snafu(display("Error running prometheus HTTP server: '{}'", source))]
        PrometheusServer { source: std::io::Error },

        #[snafu(display("Error configuring telemetry: '{}'", source))]
        TelemetryInit {
            source: telemetry::TelemetryConfigError,
        },
    }
}

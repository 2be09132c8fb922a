//! Initialization of tracing and OpenTelemetry propagation for the controller.
use opentelemetry_sdk::propagation::TraceContextPropagator;
use serde::Deserialize;
use snafu::ResultExt;
use std::env;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, registry::LookupSpan, EnvFilter, Registry,
};

const DEFAULT_TRACING_FILTER_DIRECTIVE: LevelFilter = LevelFilter::INFO;

const TRACING_FILTER_DIRECTIVE_ENV_VAR: &str = "TRACING_FILTER_DIRECTIVE";
const LOGGING_FORMATTER_ENV_VAR: &str = "LOGGING_FORMATTER";
const LOGGING_ANSI_ENABLED_ENV_VAR: &str = "LOGGING_ANSI_ENABLED";

/// The message format for logging tracing events.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Full,
    Compact,
    #[default]
    Pretty,
    /// Newline-delimited JSON, for log collectors.
    Json,
}

/// How tracing events are written to stdout.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct LogFormatter {
    pub message_format: MessageFormat,
    pub ansi_enabled: bool,
}

impl LogFormatter {
    pub fn try_from_env() -> Result<Self> {
        Self::parse(
            env::var(LOGGING_FORMATTER_ENV_VAR).ok().as_deref(),
            env::var(LOGGING_ANSI_ENABLED_ENV_VAR).ok().as_deref(),
        )
    }

    /// Builds a formatter from the raw values of the logging environment variables.
    pub fn parse(message_format: Option<&str>, ansi_enabled: Option<&str>) -> Result<Self> {
        let message_format = message_format
            .map(|formatter| {
                serde_plain::from_str(formatter).context(error::LogFormatterEnvSnafu {
                    env_value: formatter,
                })
            })
            .transpose()?
            .unwrap_or_default();

        let ansi_enabled = ansi_enabled
            .map(|ansi_enabled| {
                ansi_enabled
                    .to_lowercase()
                    .parse()
                    .context(error::LogAnsiEnvSnafu {
                        env_value: ansi_enabled,
                    })
            })
            .transpose()?
            .unwrap_or(false);

        Ok(Self {
            message_format,
            ansi_enabled,
        })
    }

    fn add_format_layer<S>(&self, event_subscriber: S) -> Box<dyn Subscriber + Send + Sync>
    where
        S: SubscriberExt + Send + Sync + for<'a> LookupSpan<'a>,
    {
        // Each formatter is a distinct layer type, so the subscriber is boxed per arm.
        let layer = fmt::layer().with_ansi(self.ansi_enabled);
        match self.message_format {
            MessageFormat::Full => Box::new(event_subscriber.with(layer)),
            MessageFormat::Compact => Box::new(event_subscriber.with(layer.compact())),
            MessageFormat::Pretty => Box::new(event_subscriber.with(layer.pretty())),
            MessageFormat::Json => Box::new(event_subscriber.with(layer.json())),
        }
    }
}

/// Installs the global tracing subscriber and the W3C trace-context propagator.
pub fn init_telemetry_from_env() -> Result<()> {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let env_filter = EnvFilter::builder()
        .with_default_directive(DEFAULT_TRACING_FILTER_DIRECTIVE.into())
        .with_env_var(TRACING_FILTER_DIRECTIVE_ENV_VAR)
        .from_env_lossy();

    let subscriber = Registry::default().with(env_filter);
    let subscriber = LogFormatter::try_from_env()?.add_format_layer(subscriber);

    tracing::subscriber::set_global_default(subscriber)
        .context(error::TracingConfigurationSnafu)?;

    Ok(())
}

pub mod error {
    use super::{LOGGING_ANSI_ENABLED_ENV_VAR, LOGGING_FORMATTER_ENV_VAR};
    use snafu::Snafu;
    use std::str::ParseBoolError;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum TelemetryConfigError {
        #[snafu(display("Error configuring tracing: '{}'", source))]
        TracingConfiguration {
            source: tracing::subscriber::SetGlobalDefaultError,
        },

        #[snafu(display(
            "Could not parse formatter from environment variable '{}={}': '{}'",
            LOGGING_FORMATTER_ENV_VAR,
            env_value,
            source
        ))]
        LogFormatterEnv {
            source: serde_plain::Error,
            env_value: String,
        },

        #[snafu(display(
            "Could not parse ANSI enablement from environment variable '{}={}': '{}'",
            LOGGING_ANSI_ENABLED_ENV_VAR,
            env_value,
            source
        ))]
        LogAnsiEnv {
            source: ParseBoolError,
            env_value: String,
        },
    }
}

pub use error::TelemetryConfigError;
type Result<T> = std::result::Result<T, TelemetryConfigError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_log_formatter_defaults() {
        assert_eq!(
            LogFormatter::parse(None, None).unwrap(),
            LogFormatter {
                message_format: MessageFormat::Pretty,
                ansi_enabled: false,
            }
        );
    }

    #[test]
    fn test_log_formatter_parse() {
        assert_eq!(
            LogFormatter::parse(Some("json"), Some("TRUE")).unwrap(),
            LogFormatter {
                message_format: MessageFormat::Json,
                ansi_enabled: true,
            }
        );
        assert!(matches!(
            LogFormatter::parse(Some("xml"), None),
            Err(TelemetryConfigError::LogFormatterEnv { .. })
        ));
        assert!(matches!(
            LogFormatter::parse(None, Some("yes")),
            Err(TelemetryConfigError::LogAnsiEnv { .. })
        ));
    }
}

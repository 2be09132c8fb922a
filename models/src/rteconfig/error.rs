use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to serialize RTE configuration: '{}'", source))]
    Serialize { source: serde_yaml::Error },

    #[snafu(display("Unable to parse RTE configuration: '{}'", source))]
    Parse { source: serde_yaml::Error },

    #[snafu(display("Unable to read RTE configuration file '{}': '{}'", path.display(), source))]
    ReadConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse RTE configuration file '{}': '{}'", path.display(), source))]
    ParseConfigFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("No RTE configuration ConfigMap was provided"))]
    MissingConfigMap {},

    #[snafu(display("ConfigMap '{}/{}' carries no data", namespace, name))]
    MissingData { namespace: String, name: String },

    #[snafu(display("ConfigMap '{}/{}' does not contain key '{}'", namespace, name, key))]
    MissingKey {
        key: String,
        namespace: String,
        name: String,
    },
}

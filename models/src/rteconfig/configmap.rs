use super::error::{self, Result};
use crate::constants::RTE_CONFIG_KEY;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use maplit::btreemap;
use snafu::OptionExt;

/// Builds the ConfigMap which publishes a rendered RTE configuration under the well-known key.
pub fn create_config_map(namespace: &str, name: &str, data: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(btreemap! {
            RTE_CONFIG_KEY.to_string() => data.to_string(),
        }),
        ..Default::default()
    }
}

/// Returns the rendered RTE configuration stored in a ConfigMap.
///
/// An absent ConfigMap, one without data, and one without the well-known key are reported as distinct errors.
pub fn unpack_config_map(config_map: Option<&ConfigMap>) -> Result<&str> {
    let config_map = config_map.context(error::MissingConfigMapSnafu)?;
    let data = config_map.data.as_ref().context(error::MissingDataSnafu {
        namespace: config_map.namespace().unwrap_or_default(),
        name: config_map.name_any(),
    })?;
    data.get(RTE_CONFIG_KEY)
        .map(String::as_str)
        .context(error::MissingKeySnafu {
            key: RTE_CONFIG_KEY,
            namespace: config_map.namespace().unwrap_or_default(),
            name: config_map.name_any(),
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rteconfig::Error;

    #[test]
    fn test_create_config_map() {
        let cm = create_config_map("numaresources", "numaresourcesoperator-worker", "foo: bar\n");
        assert_eq!(cm.name_any(), "numaresourcesoperator-worker");
        assert_eq!(cm.namespace().as_deref(), Some("numaresources"));
        assert_eq!(
            cm.data,
            Some(btreemap! { "config.yaml".to_string() => "foo: bar\n".to_string() })
        );
        assert_eq!(unpack_config_map(Some(&cm)).unwrap(), "foo: bar\n");
    }

    #[test]
    fn test_unpack_failures() {
        assert!(matches!(
            unpack_config_map(None),
            Err(Error::MissingConfigMap { .. })
        ));

        let mut cm = create_config_map("numaresources", "test", "");
        cm.data = None;
        assert!(matches!(
            unpack_config_map(Some(&cm)),
            Err(Error::MissingData { .. })
        ));

        cm.data = Some(btreemap! { "other.yaml".to_string() => "".to_string() });
        match unpack_config_map(Some(&cm)) {
            Err(Error::MissingKey {
                key,
                namespace,
                name,
            }) => {
                assert_eq!(key, "config.yaml");
                assert_eq!(namespace, "numaresources");
                assert_eq!(name, "test");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

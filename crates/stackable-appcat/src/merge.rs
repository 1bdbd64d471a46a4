//! Merges the service defaults with the user spec.
use serde_json::Value;
use snafu::{ResultExt, Snafu};

use crate::{
    config::{ChartIdentity, ConnectionSecretTemplate, ServiceConfig},
    path::{self, PathAccessor, set_value},
    tree::{ParameterTree, deep_clone},
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// The root segment mapping source paths may start with.
pub const USER_SPEC_ROOT_SEGMENT: &str = "spec";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "failed to map user spec field {source_path:?} onto Helm values field {destination_path:?}"
    ))]
    ApplyMapping {
        source: path::Error,
        source_path: String,
        destination_path: String,
    },
}

/// The result of a merge, and the sole input to synthesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedConfig {
    pub chart: ChartIdentity,

    /// The defaults with all user overrides applied.
    pub values: ParameterTree,

    pub connection_secret: Option<ConnectionSecretTemplate>,
}

/// Applies the field mapping of a [`ServiceConfig`] to a user spec.
#[derive(Clone, Debug)]
pub struct ConfigMerger {
    user_spec_accessor: PathAccessor,
}

impl Default for ConfigMerger {
    fn default() -> Self {
        Self::new(PathAccessor::with_root_segment(USER_SPEC_ROOT_SEGMENT))
    }
}

impl ConfigMerger {
    /// Creates a merger which reads the user spec through `user_spec_accessor`.
    pub fn new(user_spec_accessor: PathAccessor) -> Self {
        Self { user_spec_accessor }
    }

    /// Produces the merged Helm values for `user_spec`.
    ///
    /// The defaults of `config` are copied first and never modified. For every
    /// mapping entry the user-provided value (if any) replaces whatever the
    /// defaults contain at the destination. A missing user value keeps the
    /// default in place. A destination that conflicts with the structure of
    /// the defaults fails the whole merge.
    pub fn merge(&self, config: &ServiceConfig, user_spec: &Value) -> Result<MergedConfig> {
        let mut values = deep_clone(&config.default_values);

        for entry in config.mapping.iter() {
            let value = match self.user_spec_accessor.get(user_spec, &entry.source) {
                Ok(value) => value,
                Err(error) if error.is_not_found() => {
                    tracing::debug!(
                        source_path = %entry.source,
                        "user spec provides no value, keeping default"
                    );
                    continue;
                }
                Err(error) => {
                    tracing::warn!(
                        source_path = %entry.source,
                        error = &error as &dyn std::error::Error,
                        "user spec has an unexpected shape, keeping default"
                    );
                    continue;
                }
            };

            set_value(&mut values, &entry.destination, value.clone()).with_context(|_| {
                ApplyMappingSnafu {
                    source_path: entry.source.to_string(),
                    destination_path: entry.destination.to_string(),
                }
            })?;

            tracing::debug!(
                source_path = %entry.source,
                destination_path = %entry.destination,
                "mapped user spec value"
            );
        }

        Ok(MergedConfig {
            chart: config.chart.clone(),
            values,
            connection_secret: config.connection_secret.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use serde_json::json;

    use super::*;

    fn service_config(yaml: &str) -> ServiceConfig {
        let data: Value = serde_yaml::from_str(yaml).expect("test YAML is valid");
        let Value::Object(data) = data else {
            panic!("service config must be a mapping");
        };
        ServiceConfig::from_data(&data).expect("test service config is valid")
    }

    fn redis_config() -> ServiceConfig {
        service_config(indoc! {"
            chart: {repository: r, name: redis, defaultVersion: '1.0'}
            defaultHelmValues:
              auth:
                enabled: true
              resources:
                cpu: 100m
              replicaCount: 1
            mapping:
              spec.size.cpu: resources.cpu
              spec.replicas: replicaCount
              spec.storage.size: persistence.size
            connectionSecret:
              fields:
                - key: url
                  value: redis://${instanceName}:6379
        "})
    }

    #[test]
    fn empty_user_spec_keeps_defaults() {
        let config = redis_config();
        let merged = ConfigMerger::default()
            .merge(&config, &json!({}))
            .expect("merge succeeds");

        assert_eq!(merged.values, config.default_values);
        assert_eq!(merged.chart, config.chart);
        assert_eq!(merged.connection_secret, config.connection_secret);
    }

    #[test]
    fn user_values_override_defaults() {
        let config = redis_config();
        let merged = ConfigMerger::default()
            .merge(&config, &json!({"size": {"cpu": "500m"}, "replicas": 3}))
            .expect("merge succeeds");

        assert_eq!(merged.values["resources"]["cpu"], "500m");
        assert_eq!(merged.values["replicaCount"], 3);
        assert_eq!(merged.values["auth"]["enabled"], true);
        assert!(!merged.values.contains_key("persistence"));
    }

    #[test]
    fn user_values_create_missing_destinations() {
        let merged = ConfigMerger::default()
            .merge(&redis_config(), &json!({"storage": {"size": "8Gi"}}))
            .expect("merge succeeds");

        assert_eq!(merged.values["persistence"], json!({"size": "8Gi"}));
    }

    #[test]
    fn merge_does_not_modify_defaults() {
        let config = redis_config();
        let defaults = config.default_values.clone();

        ConfigMerger::default()
            .merge(&config, &json!({"size": {"cpu": "4"}}))
            .expect("merge succeeds");

        assert_eq!(config.default_values, defaults);
    }

    #[test]
    fn complex_user_values_are_copied_verbatim() {
        let config = service_config(indoc! {"
            chart: {repository: r, name: redis, defaultVersion: '1.0'}
            defaultHelmValues: {}
            mapping:
              spec.tolerations: master.tolerations
            connectionSecret: null
        "});
        let tolerations = json!([{"key": "dedicated", "operator": "Equal", "value": "db"}]);

        let merged = ConfigMerger::default()
            .merge(&config, &json!({"tolerations": tolerations}))
            .expect("merge succeeds");

        assert_eq!(merged.values["master"]["tolerations"], tolerations);
    }

    #[test]
    fn user_spec_shape_conflicts_keep_defaults() {
        let config = redis_config();
        let merged = ConfigMerger::default()
            .merge(&config, &json!({"size": "large"}))
            .expect("merge succeeds");

        assert_eq!(merged.values["resources"]["cpu"], "100m");
    }

    #[test]
    fn aliased_destinations_resolve_deterministically() {
        let config = service_config(indoc! {"
            chart: {repository: r, name: redis, defaultVersion: '1.0'}
            defaultHelmValues: {}
            mapping:
              spec.b: target
              spec.a: target
            connectionSecret: null
        "});

        let merged = ConfigMerger::default()
            .merge(&config, &json!({"a": "from-a", "b": "from-b"}))
            .expect("merge succeeds");

        assert_eq!(merged.values["target"], "from-b");
    }

    #[test]
    fn destination_conflict_fails_merge() {
        let config = service_config(indoc! {"
            chart: {repository: r, name: redis, defaultVersion: '1.0'}
            defaultHelmValues:
              master: not-a-map
            mapping:
              spec.x: master.y
            connectionSecret: null
        "});

        let error = ConfigMerger::default()
            .merge(&config, &json!({"x": 1}))
            .unwrap_err();

        let Error::ApplyMapping {
            source,
            source_path,
            destination_path,
        } = error;
        assert_eq!(source_path, "spec.x");
        assert_eq!(destination_path, "master.y");
        assert!(matches!(source, path::Error::TypeMismatch { .. }));
    }

    #[test]
    fn accessor_without_root_segment_reads_literal_paths() {
        let config = redis_config();
        let merged = ConfigMerger::new(PathAccessor::new())
            .merge(&config, &json!({"spec": {"replicas": 5}}))
            .expect("merge succeeds");

        assert_eq!(merged.values["replicaCount"], 5);
    }
}

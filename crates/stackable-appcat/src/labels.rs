//! Well-known label keys and values attached to composed resources.
use std::collections::BTreeMap;

use const_format::concatcp;

/// The well-known Kubernetes app key prefix.
const K8S_APP_KEY_PREFIX: &str = "app.kubernetes.io/";

/// The well-known Kubernetes app instance key `app.kubernetes.io/instance`. It
/// is set to the name of the composite resource, e.g. `my-redis`.
pub const K8S_APP_INSTANCE_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "instance");

/// The well-known Kubernetes app component key `app.kubernetes.io/component`.
pub const K8S_APP_COMPONENT_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "component");

/// The well-known Kubernetes app managed-by key `app.kubernetes.io/managed-by`.
/// It indicates which tool manages the composed resources, e.g. `crossplane`.
pub const K8S_APP_MANAGED_BY_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "managed-by");

/// The default value of the managed-by label.
pub const DEFAULT_MANAGED_BY: &str = "crossplane";

/// The component value of connection secrets.
pub const CONNECTION_SECRET_COMPONENT: &str = "connection-secret";

/// Returns the labels shared by all resources composed for `instance`.
pub fn instance_labels(instance: &str, managed_by: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_APP_INSTANCE_KEY.to_owned(), instance.to_owned()),
        (K8S_APP_MANAGED_BY_KEY.to_owned(), managed_by.to_owned()),
    ])
}

/// Returns the labels of the connection secret composed for `instance`.
pub fn connection_secret_labels(instance: &str, managed_by: &str) -> BTreeMap<String, String> {
    let mut labels = instance_labels(instance, managed_by);
    labels.insert(
        K8S_APP_COMPONENT_KEY.to_owned(),
        CONNECTION_SECRET_COMPONENT.to_owned(),
    );
    labels
}

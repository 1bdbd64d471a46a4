//! The request and response documents exchanged with the function runner.
//!
//! The shapes follow the composition function protocol: the observed
//! composite resource and its previously composed resources come in, the
//! desired composed resources and connection details go out. Transport and
//! framing are handled by the caller.
use std::collections::BTreeMap;

use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, Snafu};

use crate::tree::ValueKind;

type Result<T, E = Error> = std::result::Result<T, E>;

const SPEC_KEY: &str = "spec";
const WRITE_CONNECTION_SECRET_TO_REF_KEY: &str = "writeConnectionSecretToRef";

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("the request does not contain an observed composite resource"))]
    MissingComposite,

    #[snafu(display("the request does not contain a function input"))]
    MissingInput,

    #[snafu(display("required field {field:?} is missing from the composite resource"))]
    MissingField { field: String },

    #[snafu(display("composite resource field {field:?} must be a {expected}, found a {actual}"))]
    UnexpectedKind {
        field: String,
        expected: ValueKind,
        actual: ValueKind,
    },
}

/// The logical role of a composed resource, used as its key in requests and
/// responses.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    strum::AsRefStr,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum ResourceRole {
    /// The Helm release deploying the service chart.
    HelmRelease,

    /// The connection secret.
    Secret,
}

/// Resources composed by a previous reconciliation, keyed by role.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservedResources(BTreeMap<String, DynamicObject>);

impl ObservedResources {
    pub fn get(&self, role: ResourceRole) -> Option<&DynamicObject> {
        self.0.get(role.as_ref())
    }
}

/// The observed state of the composite resource and its composed resources.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedState {
    pub composite: Option<DynamicObject>,

    #[serde(default)]
    pub resources: ObservedResources,
}

/// A single invocation of the composition function.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRequest {
    #[serde(default)]
    pub observed: ObservedState,

    /// The function input declared in the composition, carrying the service
    /// configuration under `data`.
    pub input: Option<Value>,
}

impl FunctionRequest {
    pub fn composite(&self) -> Result<&DynamicObject> {
        self.observed.composite.as_ref().context(MissingCompositeSnafu)
    }

    pub fn input(&self) -> Result<&Value> {
        self.input.as_ref().context(MissingInputSnafu)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    /// How long the caller may cache this response before calling again.
    pub ttl_seconds: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredComposite {
    /// Connection details published on the composite resource.
    pub connection_details: BTreeMap<String, String>,
    pub ready: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    pub composite: DesiredComposite,

    /// Desired composed resources, keyed by [`ResourceRole`].
    pub resources: BTreeMap<String, Value>,
}

/// The result of a single invocation of the composition function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub meta: ResponseMeta,
    pub desired: DesiredState,
}

/// Name and namespace of the composite resource being reconciled.
///
/// Every composed resource is named after and placed next to the instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceIdentity {
    pub name: String,
    pub namespace: String,
}

impl InstanceIdentity {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn from_composite(composite: &DynamicObject) -> Result<Self> {
        let name = composite
            .metadata
            .name
            .clone()
            .context(MissingFieldSnafu {
                field: "metadata.name",
            })?;
        let namespace = composite
            .metadata
            .namespace
            .clone()
            .context(MissingFieldSnafu {
                field: "metadata.namespace",
            })?;

        Ok(Self { name, namespace })
    }
}

/// The optional `spec.writeConnectionSecretToRef` of a composite resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,
}

/// Where the connection secret is written to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretDestination {
    pub name: String,
    pub namespace: String,
}

impl SecretReference {
    /// Reads the reference from the composite spec.
    ///
    /// A missing or malformed reference is treated as absent, the secret then
    /// follows the instance.
    pub fn from_composite(composite: &DynamicObject) -> Self {
        let reference = composite
            .data
            .get(SPEC_KEY)
            .and_then(|spec| spec.get(WRITE_CONNECTION_SECRET_TO_REF_KEY))
            .filter(|reference| !reference.is_null());

        match reference.map(Self::deserialize) {
            Some(Ok(reference)) => reference,
            Some(Err(error)) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "ignoring malformed connection secret reference"
                );
                Self::default()
            }
            None => Self::default(),
        }
    }

    /// Resolves the destination, falling back to the instance name and
    /// namespace for every part that is not set.
    pub fn resolve(&self, instance: &InstanceIdentity) -> SecretDestination {
        let non_empty = |part: &Option<String>| part.clone().filter(|part| !part.is_empty());

        SecretDestination {
            name: non_empty(&self.name).unwrap_or_else(|| instance.name.clone()),
            namespace: non_empty(&self.namespace).unwrap_or_else(|| instance.namespace.clone()),
        }
    }
}

/// Returns the `spec` of the composite resource, which holds the user
/// parameters.
pub fn extract_user_spec(composite: &DynamicObject) -> Result<&Value> {
    let spec = composite
        .data
        .get(SPEC_KEY)
        .context(MissingFieldSnafu { field: SPEC_KEY })?;

    match spec {
        Value::Object(_) => Ok(spec),
        other => UnexpectedKindSnafu {
            field: SPEC_KEY,
            expected: ValueKind::Mapping,
            actual: ValueKind::from(other),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    fn composite(yaml: &str) -> DynamicObject {
        serde_yaml::from_str(yaml).expect("test YAML is valid")
    }

    fn redis_composite() -> DynamicObject {
        composite(indoc! {"
            apiVersion: appcat.stackable.tech/v1alpha1
            kind: XRedis
            metadata:
              name: my-redis
              namespace: ns1
            spec:
              replicas: 3
              writeConnectionSecretToRef:
                name: redis-credentials
        "})
    }

    #[test]
    fn parse_request() {
        let request: FunctionRequest = serde_yaml::from_str(indoc! {"
            observed:
              composite:
                apiVersion: appcat.stackable.tech/v1alpha1
                kind: XRedis
                metadata:
                  name: my-redis
                  namespace: ns1
                spec:
                  replicas: 3
              resources:
                helmrelease:
                  apiVersion: helm.crossplane.io/v1beta1
                  kind: Release
                  metadata:
                    name: my-redis
                  spec:
                    forProvider:
                      values:
                        auth:
                          password: abc123
            input:
              data:
                chart: {}
        "})
        .expect("test YAML is valid");

        let composite = request.composite().expect("composite is present");
        assert_eq!(composite.metadata.name.as_deref(), Some("my-redis"));
        assert!(request.observed.resources.get(ResourceRole::HelmRelease).is_some());
        assert!(request.observed.resources.get(ResourceRole::Secret).is_none());
        assert!(request.input().is_ok());
    }

    #[test]
    fn missing_composite_and_input() {
        let request = FunctionRequest::default();

        assert_eq!(request.composite().unwrap_err(), Error::MissingComposite);
        assert_eq!(request.input().unwrap_err(), Error::MissingInput);
    }

    #[test]
    fn instance_identity_from_metadata() {
        let identity =
            InstanceIdentity::from_composite(&redis_composite()).expect("identity is present");

        assert_eq!(identity, InstanceIdentity::new("my-redis", "ns1"));
    }

    #[test]
    fn instance_identity_requires_namespace() {
        let error = InstanceIdentity::from_composite(&composite(indoc! {"
            apiVersion: appcat.stackable.tech/v1alpha1
            kind: XRedis
            metadata:
              name: my-redis
            spec: {}
        "}))
        .unwrap_err();

        assert_eq!(
            error,
            Error::MissingField {
                field: "metadata.namespace".to_owned()
            }
        );
    }

    #[test]
    fn user_spec_is_extracted() {
        let composite = redis_composite();
        let spec = extract_user_spec(&composite).expect("spec is present");

        assert_eq!(spec["replicas"], 3);
    }

    #[rstest]
    #[case("spec: not-a-map", ValueKind::String)]
    #[case("spec: [1]", ValueKind::Sequence)]
    fn user_spec_must_be_a_mapping(#[case] spec: &str, #[case] actual: ValueKind) {
        let composite = composite(&format!(
            "apiVersion: v1\nkind: XRedis\nmetadata:\n  name: a\n{spec}\n"
        ));

        assert_eq!(
            extract_user_spec(&composite).unwrap_err(),
            Error::UnexpectedKind {
                field: SPEC_KEY.to_owned(),
                expected: ValueKind::Mapping,
                actual,
            }
        );
    }

    #[test]
    fn secret_reference_overrides_name() {
        let composite = redis_composite();
        let instance = InstanceIdentity::from_composite(&composite).expect("identity is present");
        let destination = SecretReference::from_composite(&composite).resolve(&instance);

        assert_eq!(
            destination,
            SecretDestination {
                name: "redis-credentials".to_owned(),
                namespace: "ns1".to_owned(),
            }
        );
    }

    #[rstest]
    #[case("spec: {}")]
    #[case("spec: {writeConnectionSecretToRef: null}")]
    #[case("spec: {writeConnectionSecretToRef: not-a-map}")]
    #[case("spec: {writeConnectionSecretToRef: {name: '', namespace: ''}}")]
    fn secret_reference_falls_back_to_instance(#[case] spec: &str) {
        let composite = composite(&format!(
            "apiVersion: v1\nkind: XRedis\nmetadata:\n  name: my-redis\n  namespace: ns1\n{spec}\n"
        ));
        let instance = InstanceIdentity::new("my-redis", "ns1");

        assert_eq!(
            SecretReference::from_composite(&composite).resolve(&instance),
            SecretDestination {
                name: "my-redis".to_owned(),
                namespace: "ns1".to_owned(),
            }
        );
    }

    #[test]
    fn resource_role_keys() {
        assert_eq!(ResourceRole::HelmRelease.to_string(), "helmrelease");
        assert_eq!(ResourceRole::Secret.as_ref(), "secret");
        assert_eq!("secret".parse::<ResourceRole>(), Ok(ResourceRole::Secret));
    }
}

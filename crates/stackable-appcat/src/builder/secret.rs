//! Builds the opaque connection [`Secret`] of an instance.
use std::collections::BTreeMap;

use k8s_openapi::{
    ByteString, api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use snafu::{OptionExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

const OPAQUE_SECRET_TYPE: &str = "Opaque";

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("secret requires a name"))]
    MissingName,

    #[snafu(display("secret requires a namespace"))]
    MissingNamespace,
}

/// A builder to build opaque [`Secret`] objects holding connection values.
///
/// Entries are stored base64 encoded in [`Secret::data`]. Adding a key twice
/// keeps the last value.
#[derive(Clone, Debug, Default)]
pub struct SecretBuilder {
    name: Option<String>,
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    data: BTreeMap<String, String>,
}

impl SecretBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_labels(&mut self, labels: BTreeMap<String, String>) -> &mut Self {
        self.labels.extend(labels);
        self
    }

    pub fn add_entry(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn add_entries<K, V>(&mut self, entries: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.add_entry(key, value);
        }
        self
    }

    pub fn build(&self) -> Result<Secret> {
        let name = self.name.clone().context(MissingNameSnafu)?;
        let namespace = self.namespace.clone().context(MissingNamespaceSnafu)?;

        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(name),
                namespace: Some(namespace),
                labels: (!self.labels.is_empty()).then(|| self.labels.clone()),
                ..ObjectMeta::default()
            },
            data: Some(
                self.data
                    .iter()
                    .map(|(key, value)| (key.clone(), ByteString(value.clone().into_bytes())))
                    .collect(),
            ),
            type_: Some(OPAQUE_SECRET_TYPE.to_owned()),
            ..Secret::default()
        })
    }
}

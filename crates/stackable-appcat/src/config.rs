//! The service configuration consumed by the engine.
//!
//! A service configuration is supplied as the `data` of the composition
//! function input and describes one catalog service:
//!
//! ```yaml
//! data:
//!   chart:
//!     repository: https://charts.bitnami.com/bitnami
//!     name: redis
//!     defaultVersion: 19.6.4
//!   defaultHelmValues:
//!     architecture: standalone
//!     auth:
//!       enabled: true
//!   mapping:
//!     spec.replicas: replica.replicaCount
//!     spec.size.memory: master.resources.requests.memory
//!   connectionSecret:
//!     passwordPath: auth.password
//!     fields:
//!       - key: url
//!         value: redis://:${password}@${instanceName}-master.${namespace}:6379
//! ```
//!
//! All four top-level keys are mandatory. `connectionSecret` may be `null` to
//! declare that the service publishes no connection secret.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    path::{self, FieldPath},
    template,
    tree::{ParameterTree, ValueKind},
};

type Result<T, E = Error> = std::result::Result<T, E>;

const DATA_KEY: &str = "data";
const CHART_KEY: &str = "chart";
const DEFAULT_VALUES_KEY: &str = "defaultHelmValues";
const DEFAULT_VALUES_ALIAS: &str = "defaultParameterTree";
const MAPPING_KEY: &str = "mapping";
const MAPPING_ALIAS: &str = "fieldMapping";
const CONNECTION_SECRET_KEY: &str = "connectionSecret";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("required field {field:?} is missing from the service configuration"))]
    MissingField { field: String },

    #[snafu(display("service configuration field {field:?} must be a {expected}, found a {actual}"))]
    UnexpectedKind {
        field: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[snafu(display("failed to parse mapped field path {path:?}"))]
    ParseMappingPath { source: path::Error, path: String },

    #[snafu(display("failed to parse the connection secret template"))]
    ParseConnectionSecret { source: serde_json::Error },

    #[snafu(display("failed to parse connection secret injection path {path:?}"))]
    ParseInjectionPath { source: path::Error, path: String },

    #[snafu(display(
        "the connection secret template uses the credential but there is nowhere to store it, \
         declare a passwordPath or compose the connection secret"
    ))]
    UnstoredCredential,
}

/// Identifies the Helm chart deployed for a service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIdentity {
    pub repository: String,
    pub name: String,
    pub default_version: String,
}

impl ChartIdentity {
    /// Ensures that no identity field is empty.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("chart.repository", &self.repository),
            ("chart.name", &self.name),
            ("chart.defaultVersion", &self.default_version),
        ] {
            if value.is_empty() {
                return MissingFieldSnafu { field }.fail();
            }
        }

        Ok(())
    }

    fn from_value(chart: &Value) -> Result<Self> {
        let chart = as_mapping(CHART_KEY, chart)?;
        let identity = Self {
            repository: required_string(chart, "repository")?,
            name: required_string(chart, "name")?,
            default_version: required_string(chart, "defaultVersion")?,
        };
        identity.validate()?;

        Ok(identity)
    }
}

/// One entry of a [`FieldMapping`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingEntry {
    /// Where to read the value in the user spec.
    pub source: FieldPath,

    /// Where to write the value in the Helm values.
    pub destination: FieldPath,
}

/// Maps paths in the user spec onto paths in the Helm values.
///
/// Entries are kept in lexicographic order of their source path, so that two
/// entries writing to the same destination resolve the same way on every pass
/// (the later entry wins).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldMapping {
    entries: Vec<MappingEntry>,
}

impl FieldMapping {
    /// Builds the mapping from its raw declaration.
    ///
    /// Entries whose destination is not a string are skipped with a warning.
    pub fn from_declaration(declaration: &ParameterTree) -> Result<Self> {
        let mut sorted = BTreeMap::new();

        for (source, destination) in declaration {
            let Some(destination) = destination.as_str() else {
                tracing::warn!(
                    source = source.as_str(),
                    destination.kind = %ValueKind::from(destination),
                    "ignoring field mapping with a non-string destination"
                );
                continue;
            };

            let entry = MappingEntry {
                source: parse_mapping_path(source)?,
                destination: parse_mapping_path(destination)?,
            };
            sorted.insert(source.as_str(), entry);
        }

        Ok(Self {
            entries: sorted.into_values().collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single key of the connection secret and the template producing its value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretFieldTemplate {
    pub key: String,

    #[serde(alias = "valueTemplate")]
    pub value: String,
}

/// Describes how the generated credential is surfaced.
///
/// - `password_path` injects the credential into the Helm values.
/// - `existing_secret_path` injects the *name* of the connection secret into
///   the Helm values, for charts that read credentials from an existing secret.
/// - `fields` are rendered into the connection secret and connection details.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionSecretTemplate {
    pub password_path: Option<FieldPath>,
    pub existing_secret_path: Option<FieldPath>,
    pub fields: Vec<SecretFieldTemplate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionSecretDeclaration {
    #[serde(default)]
    fields: Vec<SecretFieldTemplate>,

    #[serde(default, alias = "passwordInjectionPath")]
    password_path: Option<String>,

    #[serde(default, alias = "existingSecretNameInjectionPath")]
    existing_secret_path: Option<String>,
}

impl ConnectionSecretTemplate {
    /// Whether the credential ends up in the Helm values or in any field.
    pub fn uses_password(&self) -> bool {
        let password_placeholder = template::placeholder(template::PASSWORD);

        self.password_path.is_some()
            || self
                .fields
                .iter()
                .any(|field| field.value.contains(&password_placeholder))
    }

    /// Ensures a credential used by this template can be read back on the
    /// next pass.
    ///
    /// The Helm release is always composed, so a `passwordPath` is enough.
    /// Otherwise the credential has to be kept in the connection secret, which
    /// requires `composes_secret`.
    pub fn ensure_credential_is_stored(&self, composes_secret: bool) -> Result<()> {
        if self.uses_password() && self.password_path.is_none() && !composes_secret {
            return UnstoredCredentialSnafu.fail();
        }

        Ok(())
    }

    fn from_value(value: &Value) -> Result<Option<Self>> {
        if value.is_null() {
            return Ok(None);
        }

        let declaration = ConnectionSecretDeclaration::deserialize(value)
            .context(ParseConnectionSecretSnafu)?;

        Ok(Some(Self {
            password_path: parse_injection_path(declaration.password_path)?,
            existing_secret_path: parse_injection_path(declaration.existing_secret_path)?,
            fields: declaration.fields,
        }))
    }
}

/// The validated configuration of one catalog service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub chart: ChartIdentity,
    pub default_values: ParameterTree,
    pub mapping: FieldMapping,
    pub connection_secret: Option<ConnectionSecretTemplate>,
}

impl ServiceConfig {
    /// Extracts the service configuration from the composition function input.
    pub fn from_input(input: &Value) -> Result<Self> {
        let data = input.get(DATA_KEY).context(MissingFieldSnafu { field: DATA_KEY })?;
        Self::from_data(as_mapping(DATA_KEY, data)?)
    }

    /// Validates and types the service configuration mapping itself.
    pub fn from_data(data: &ParameterTree) -> Result<Self> {
        let chart = required(data, CHART_KEY, None)?;
        let default_values = required(data, DEFAULT_VALUES_KEY, Some(DEFAULT_VALUES_ALIAS))?;
        let mapping = required(data, MAPPING_KEY, Some(MAPPING_ALIAS))?;
        let connection_secret = required(data, CONNECTION_SECRET_KEY, None)?;

        let config = Self {
            chart: ChartIdentity::from_value(chart)?,
            default_values: as_mapping(DEFAULT_VALUES_KEY, default_values)?.clone(),
            mapping: FieldMapping::from_declaration(as_mapping(MAPPING_KEY, mapping)?)?,
            connection_secret: ConnectionSecretTemplate::from_value(connection_secret)?,
        };

        tracing::debug!(
            chart.name = %config.chart.name,
            chart.version = %config.chart.default_version,
            mappings = config.mapping.len(),
            connection_secret = config.connection_secret.is_some(),
            "parsed service configuration"
        );

        Ok(config)
    }
}

fn required<'a>(data: &'a ParameterTree, key: &str, alias: Option<&str>) -> Result<&'a Value> {
    data.get(key)
        .or_else(|| alias.and_then(|alias| data.get(alias)))
        .context(MissingFieldSnafu { field: key })
}

fn required_string(mapping: &ParameterTree, key: &str) -> Result<String> {
    let field = format!("{CHART_KEY}.{key}");
    match mapping.get(key) {
        None | Some(Value::Null) => MissingFieldSnafu { field }.fail(),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => UnexpectedKindSnafu {
            field,
            expected: ValueKind::String,
            actual: ValueKind::from(other),
        }
        .fail(),
    }
}

fn as_mapping<'a>(field: &str, value: &'a Value) -> Result<&'a ParameterTree> {
    match value {
        Value::Object(mapping) => Ok(mapping),
        Value::Null => MissingFieldSnafu { field }.fail(),
        other => UnexpectedKindSnafu {
            field,
            expected: ValueKind::Mapping,
            actual: ValueKind::from(other),
        }
        .fail(),
    }
}

fn parse_mapping_path(path: &str) -> Result<FieldPath> {
    path.parse().context(ParseMappingPathSnafu { path })
}

fn parse_injection_path(path: Option<String>) -> Result<Option<FieldPath>> {
    match path.as_deref() {
        None | Some("") => Ok(None),
        Some(path) => path
            .parse()
            .map(Some)
            .context(ParseInjectionPathSnafu { path }),
    }
}

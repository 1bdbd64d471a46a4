//! Turns a [`MergedConfig`] into the composed resources of one instance.
//!
//! Synthesis resolves the credential, injects it (and optionally the name of
//! the connection secret) into the Helm values, renders the connection secret
//! template and builds the descriptors. It either produces the complete set of
//! descriptors or fails without a partial result.
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::core::DynamicObject;
use serde_json::Value;
use snafu::{ResultExt, Snafu};

use crate::{
    builder::{
        self,
        release::{self, HelmReleaseBuilder},
        secret::SecretBuilder,
    },
    config::{self, ConnectionSecretTemplate},
    labels::{self, DEFAULT_MANAGED_BY},
    merge::MergedConfig,
    path::{self, set_value},
    request::{InstanceIdentity, ObservedResources, ResourceRole, SecretReference},
    secret::{DEFAULT_PASSWORD_LENGTH, STORED_CREDENTIAL_KEY, SecretLifecycle, SecretValue},
    template::{self, TemplateVariables},
    tree::ParameterTree,
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid chart identity"))]
    InvalidChart { source: config::Error },

    #[snafu(display("invalid connection secret template"))]
    InvalidConnectionSecret { source: config::Error },

    #[snafu(display("failed to inject the credential into Helm values field {path:?}"))]
    InjectPassword { source: path::Error, path: String },

    #[snafu(display(
        "failed to inject the connection secret name into Helm values field {path:?}"
    ))]
    InjectSecretName { source: path::Error, path: String },

    #[snafu(display("failed to build the helm release"))]
    BuildRelease { source: release::Error },

    #[snafu(display("failed to build the connection secret"))]
    BuildSecret { source: builder::secret::Error },

    #[snafu(display("failed to serialize the {role} descriptor"))]
    SerializeDescriptor {
        source: serde_json::Error,
        role: ResourceRole,
    },
}

/// Where the rendered connection values are published.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::AsRefStr,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ConnectionPublication {
    /// Compose a connection secret and publish the values as connection
    /// details of the composite resource.
    #[default]
    SecretAndConnectionDetails,

    /// Only compose the connection secret.
    Secret,

    /// Only publish the values as connection details.
    ConnectionDetails,
}

impl ConnectionPublication {
    pub fn composes_secret(self) -> bool {
        matches!(self, Self::SecretAndConnectionDetails | Self::Secret)
    }

    pub fn publishes_connection_details(self) -> bool {
        matches!(self, Self::SecretAndConnectionDetails | Self::ConnectionDetails)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// The value of the `app.kubernetes.io/managed-by` label.
    pub managed_by: String,
    pub publication: ConnectionPublication,

    /// The length of newly generated credentials.
    pub password_length: usize,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            managed_by: DEFAULT_MANAGED_BY.to_owned(),
            publication: ConnectionPublication::default(),
            password_length: DEFAULT_PASSWORD_LENGTH,
        }
    }
}

/// The composed resources of one instance.
#[derive(Clone, Debug)]
pub struct Synthesis {
    pub release: DynamicObject,

    /// The connection secret, if one is composed.
    pub secret: Option<Secret>,

    /// Connection values to publish on the composite resource.
    pub connection_details: BTreeMap<String, String>,
}

impl Synthesis {
    /// Serializes the descriptors, keyed by [`ResourceRole`].
    pub fn desired_resources(&self) -> Result<BTreeMap<String, Value>> {
        let mut resources = BTreeMap::new();

        let release = serde_json::to_value(&self.release).context(SerializeDescriptorSnafu {
            role: ResourceRole::HelmRelease,
        })?;
        resources.insert(ResourceRole::HelmRelease.to_string(), release);

        if let Some(secret) = &self.secret {
            let secret = serde_json::to_value(secret).context(SerializeDescriptorSnafu {
                role: ResourceRole::Secret,
            })?;
            resources.insert(ResourceRole::Secret.to_string(), secret);
        }

        Ok(resources)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResourceSynthesizer {
    options: SynthesisOptions,
}

impl ResourceSynthesizer {
    pub fn new(options: SynthesisOptions) -> Self {
        Self { options }
    }

    /// Builds the composed resources of `instance` from `merged`.
    ///
    /// A credential found in `observed` is reused. Without a connection secret
    /// template only the Helm release is composed and no credential is
    /// resolved. A template using the credential without anywhere to keep it
    /// across passes is rejected.
    pub fn synthesize(
        &self,
        merged: MergedConfig,
        instance: &InstanceIdentity,
        secret_reference: &SecretReference,
        observed: &ObservedResources,
    ) -> Result<Synthesis> {
        let MergedConfig {
            chart,
            mut values,
            connection_secret,
        } = merged;
        chart.validate().context(InvalidChartSnafu)?;

        let publication = self.options.publication;
        let mut connection_values = BTreeMap::new();
        let mut stored_credential = None;
        if let Some(template) = &connection_secret {
            template
                .ensure_credential_is_stored(publication.composes_secret())
                .context(InvalidConnectionSecretSnafu)?;

            let lifecycle = SecretLifecycle::for_template(
                Some(template),
                publication.composes_secret(),
                self.options.password_length,
            );
            let password = lifecycle.resolve(observed, &instance.name);
            inject_secret(&mut values, template, &password, instance, secret_reference)?;
            connection_values = render_fields(template, &password, instance, secret_reference);

            if lifecycle.stores_credential() {
                stored_credential = Some(password);
            }
        }

        let release = HelmReleaseBuilder::new()
            .name(&instance.name)
            .namespace(&instance.namespace)
            .chart(chart)
            .values(values)
            .with_labels(labels::instance_labels(
                &instance.name,
                &self.options.managed_by,
            ))
            .build()
            .context(BuildReleaseSnafu)?;

        let secret = if connection_secret.is_some() && publication.composes_secret() {
            let destination = secret_reference.resolve(instance);
            let mut secret_builder = SecretBuilder::new();
            secret_builder
                .name(destination.name)
                .namespace(destination.namespace)
                .with_labels(labels::connection_secret_labels(
                    &instance.name,
                    &self.options.managed_by,
                ))
                .add_entries(connection_values.clone());

            if let Some(password) = &stored_credential {
                secret_builder.add_entry(STORED_CREDENTIAL_KEY, password.expose());
            }

            Some(secret_builder.build().context(BuildSecretSnafu)?)
        } else {
            None
        };

        if !publication.publishes_connection_details() {
            connection_values.clear();
        }

        tracing::debug!(
            instance = instance.name.as_str(),
            %publication,
            connection_secret = secret.is_some(),
            connection_details = connection_values.len(),
            "synthesized composed resources"
        );

        Ok(Synthesis {
            release,
            secret,
            connection_details: connection_values,
        })
    }
}

fn inject_secret(
    values: &mut ParameterTree,
    template: &ConnectionSecretTemplate,
    password: &SecretValue,
    instance: &InstanceIdentity,
    secret_reference: &SecretReference,
) -> Result<()> {
    if let Some(path) = &template.password_path {
        set_value(values, path, Value::String(password.expose().to_owned())).with_context(
            |_| InjectPasswordSnafu {
                path: path.to_string(),
            },
        )?;
    }

    if let Some(path) = &template.existing_secret_path {
        let destination = secret_reference.resolve(instance);
        set_value(values, path, Value::String(destination.name)).with_context(|_| {
            InjectSecretNameSnafu {
                path: path.to_string(),
            }
        })?;
    }

    Ok(())
}

fn render_fields(
    template: &ConnectionSecretTemplate,
    password: &SecretValue,
    instance: &InstanceIdentity,
    secret_reference: &SecretReference,
) -> BTreeMap<String, String> {
    let destination = secret_reference.resolve(instance);
    let variables = TemplateVariables::new()
        .with(template::INSTANCE_NAME, &instance.name)
        .with(template::NAMESPACE, &instance.namespace)
        .with(template::PASSWORD, password.expose())
        .with(template::SECRET_NAME, destination.name)
        .with(template::SECRET_NAMESPACE, destination.namespace);

    template
        .fields
        .iter()
        .map(|field| (field.key.clone(), template::render(&field.value, &variables)))
        .collect()
}

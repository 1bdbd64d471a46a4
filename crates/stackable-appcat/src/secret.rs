//! Lifecycle of the generated service credential.
//!
//! A credential is generated once per instance. Every later reconciliation
//! reads it back from the resources composed by the previous pass and reuses
//! it verbatim, otherwise the credential would rotate on every pass. Where it
//! is read back from depends on where the [`ConnectionSecretTemplate`] surfaces
//! it. If the template surfaces it nowhere it can be read back from, it is kept
//! under [`STORED_CREDENTIAL_KEY`] of the connection secret.
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use k8s_openapi::api::core::v1::Secret;
use rand::RngCore;

use crate::{
    builder::release::values_path,
    config::ConnectionSecretTemplate,
    path::{FieldPath, get_value},
    request::{ObservedResources, ResourceRole},
    template,
};

/// The number of characters of a generated credential.
pub const DEFAULT_PASSWORD_LENGTH: usize = 32;

/// The connection secret key holding the credential when no other location
/// keeps it verbatim.
pub const STORED_CREDENTIAL_KEY: &str = "appcat-credential";

/// An opaque credential.
///
/// The value is never printed by [`Debug`](std::fmt::Debug).
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Generates a new credential of `length` URL-safe base64 characters from a
    /// cryptographically secure random source.
    pub fn generate(length: usize) -> Self {
        let mut bytes = vec![0u8; length];
        rand::rng().fill_bytes(&mut bytes);

        // Encoding n bytes yields at least n characters
        let mut encoded = URL_SAFE_NO_PAD.encode(bytes);
        encoded.truncate(length);
        Self(encoded)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// A place in the observed resources where a previous pass stored the
/// credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecretLocation {
    /// A path inside the values of the observed Helm release.
    ReleaseValues(FieldPath),

    /// A key of the observed connection secret.
    SecretData(String),

    /// The [`STORED_CREDENTIAL_KEY`] of the observed connection secret.
    StoredCredential,
}

/// Decides whether to reuse the observed credential or to generate a new one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretLifecycle {
    locations: Vec<SecretLocation>,
    length: usize,
}

impl SecretLifecycle {
    pub fn new(locations: Vec<SecretLocation>, length: usize) -> Self {
        Self { locations, length }
    }

    /// Derives the read-back locations from the shape of `template`.
    ///
    /// - A `passwordPath` means the credential is part of the Helm values.
    /// - A field whose template is exactly `${password}` means the connection
    ///   secret holds the credential verbatim under that key.
    /// - A credential that is used but kept verbatim in neither place is
    ///   stored under [`STORED_CREDENTIAL_KEY`].
    ///
    /// Secret locations are only derived if `composes_secret` is set, an
    /// uncomposed secret is never observed. The Helm release is consulted
    /// first.
    pub fn for_template(
        template: Option<&ConnectionSecretTemplate>,
        composes_secret: bool,
        length: usize,
    ) -> Self {
        let Some(template) = template else {
            return Self::new(Vec::new(), length);
        };

        let mut locations: Vec<_> = template
            .password_path
            .iter()
            .map(|path| SecretLocation::ReleaseValues(path.clone()))
            .collect();

        if composes_secret {
            let password_placeholder = template::placeholder(template::PASSWORD);
            locations.extend(
                template
                    .fields
                    .iter()
                    .filter(|field| field.value == password_placeholder)
                    .map(|field| SecretLocation::SecretData(field.key.clone())),
            );

            if locations.is_empty() && template.uses_password() {
                locations.push(SecretLocation::StoredCredential);
            }
        }

        Self::new(locations, length)
    }

    pub fn locations(&self) -> &[SecretLocation] {
        &self.locations
    }

    /// Whether the credential has to be written to [`STORED_CREDENTIAL_KEY`].
    pub fn stores_credential(&self) -> bool {
        self.locations.contains(&SecretLocation::StoredCredential)
    }

    /// Returns the credential for `instance_name`.
    ///
    /// The first non-empty value found in `observed` is reused unchanged. If
    /// there is none, a new credential is generated.
    pub fn resolve(&self, observed: &ObservedResources, instance_name: &str) -> SecretValue {
        for location in &self.locations {
            if let Some(value) = read_back(observed, location) {
                tracing::info!(
                    instance = instance_name,
                    ?location,
                    "reusing existing credential"
                );
                return value;
            }
        }

        tracing::info!(instance = instance_name, "generating new credential");
        SecretValue::generate(self.length)
    }
}

fn read_back(observed: &ObservedResources, location: &SecretLocation) -> Option<SecretValue> {
    let value = match location {
        SecretLocation::ReleaseValues(path) => {
            let release = observed.get(ResourceRole::HelmRelease)?;
            get_value(&release.data, &values_path().join(path))
                .ok()?
                .as_str()?
                .to_owned()
        }
        SecretLocation::SecretData(key) => observed_secret_entry(observed, key)?,
        SecretLocation::StoredCredential => {
            observed_secret_entry(observed, STORED_CREDENTIAL_KEY)?
        }
    };

    (!value.is_empty()).then(|| SecretValue(value))
}

fn observed_secret_entry(observed: &ObservedResources, key: &str) -> Option<String> {
    let secret = match observed
        .get(ResourceRole::Secret)?
        .clone()
        .try_parse::<Secret>()
    {
        Ok(secret) => secret,
        Err(error) => {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                "ignoring observed connection secret that failed to parse"
            );
            return None;
        }
    };

    secret_entry(&secret, key)
}

fn secret_entry(secret: &Secret, key: &str) -> Option<String> {
    let from_data = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok());

    from_data.or_else(|| {
        secret
            .string_data
            .as_ref()
            .and_then(|string_data| string_data.get(key))
            .cloned()
    })
}

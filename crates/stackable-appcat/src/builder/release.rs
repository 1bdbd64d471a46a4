//! Builds the Crossplane Helm provider `Release` deploying the service chart.
use std::collections::BTreeMap;

use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::{Value, json};
use snafu::{OptionExt, Snafu};

use crate::{config::ChartIdentity, path::FieldPath, tree::ParameterTree};

type Result<T, E = Error> = std::result::Result<T, E>;

pub const RELEASE_GROUP: &str = "helm.crossplane.io";
pub const RELEASE_VERSION: &str = "v1beta1";
pub const RELEASE_KIND: &str = "Release";

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("helm release requires a name"))]
    MissingName,

    #[snafu(display("helm release requires a namespace"))]
    MissingNamespace,

    #[snafu(display("helm release requires a chart"))]
    MissingChart,
}

/// The location of the Helm values inside a `Release` descriptor.
pub fn values_path() -> FieldPath {
    FieldPath::from_segments(&["spec", "forProvider", "values"])
}

/// Returns the API resource of the Helm provider `Release` kind.
pub fn release_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        RELEASE_GROUP,
        RELEASE_VERSION,
        RELEASE_KIND,
    ))
}

/// A builder to build `Release` objects of the Crossplane Helm provider.
///
/// Name, namespace and chart are mandatory. The namespace is used both for the
/// object itself and as the namespace the chart is installed into.
#[derive(Clone, Debug, Default)]
pub struct HelmReleaseBuilder {
    name: Option<String>,
    namespace: Option<String>,
    chart: Option<ChartIdentity>,
    values: ParameterTree,
    labels: BTreeMap<String, String>,
}

impl HelmReleaseBuilder {
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

    pub fn chart(&mut self, chart: ChartIdentity) -> &mut Self {
        self.chart = Some(chart);
        self
    }

    /// Replaces the Helm values.
    pub fn values(&mut self, values: ParameterTree) -> &mut Self {
        self.values = values;
        self
    }

    pub fn with_labels(&mut self, labels: BTreeMap<String, String>) -> &mut Self {
        self.labels.extend(labels);
        self
    }

    pub fn build(&self) -> Result<DynamicObject> {
        let name = self.name.as_deref().context(MissingNameSnafu)?;
        let namespace = self.namespace.as_deref().context(MissingNamespaceSnafu)?;
        let chart = self.chart.as_ref().context(MissingChartSnafu)?;

        let mut release = DynamicObject::new(name, &release_api_resource())
            .within(namespace)
            .data(json!({
                "spec": {
                    "forProvider": {
                        "chart": {
                            "repository": chart.repository,
                            "name": chart.name,
                            "version": chart.default_version,
                        },
                        "namespace": namespace,
                        "values": Value::Object(self.values.clone()),
                    }
                }
            }));

        if !self.labels.is_empty() {
            release.metadata.labels = Some(self.labels.clone());
        }

        Ok(release)
    }
}

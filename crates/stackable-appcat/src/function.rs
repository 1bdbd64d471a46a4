//! The request handler chaining extraction, merge and synthesis.
use snafu::{ResultExt, Snafu};
use tracing::{Span, field::Empty, instrument};

use crate::{
    config::{self, ServiceConfig},
    merge::{self, ConfigMerger},
    request::{
        self, DesiredComposite, DesiredState, FunctionRequest, FunctionResponse,
        InstanceIdentity, ResponseMeta, SecretReference, extract_user_spec,
    },
    synthesis::{self, ResourceSynthesizer, SynthesisOptions},
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// How long the caller may cache a response by default.
pub const DEFAULT_RESPONSE_TTL_SECONDS: u64 = 60;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read the function request"))]
    ReadRequest { source: request::Error },

    #[snafu(display("failed to parse the service configuration"))]
    ParseServiceConfig { source: config::Error },

    #[snafu(display("failed to merge the user spec into the service defaults"))]
    MergeConfig { source: merge::Error },

    #[snafu(display("failed to synthesize the composed resources"))]
    SynthesizeResources { source: synthesis::Error },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    pub synthesis: SynthesisOptions,
    pub response_ttl_seconds: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            synthesis: SynthesisOptions::default(),
            response_ttl_seconds: DEFAULT_RESPONSE_TTL_SECONDS,
        }
    }
}

/// Answers composition function requests for AppCat services.
///
/// The function itself is stateless. Everything it needs to produce a
/// response, including previously generated credentials, is part of the
/// request.
#[derive(Clone, Debug)]
pub struct CompositionFunction {
    merger: ConfigMerger,
    synthesizer: ResourceSynthesizer,
    response_ttl_seconds: u64,
}

impl Default for CompositionFunction {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl CompositionFunction {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            merger: ConfigMerger::default(),
            synthesizer: ResourceSynthesizer::new(options.synthesis),
            response_ttl_seconds: options.response_ttl_seconds,
        }
    }

    #[instrument(skip_all, fields(instance = Empty, namespace = Empty))]
    pub fn run(&self, request: &FunctionRequest) -> Result<FunctionResponse> {
        let composite = request.composite().context(ReadRequestSnafu)?;
        let instance = InstanceIdentity::from_composite(composite).context(ReadRequestSnafu)?;

        let span = Span::current();
        span.record("instance", instance.name.as_str());
        span.record("namespace", instance.namespace.as_str());

        let user_spec = extract_user_spec(composite).context(ReadRequestSnafu)?;
        let secret_reference = SecretReference::from_composite(composite);
        let input = request.input().context(ReadRequestSnafu)?;
        let service_config = ServiceConfig::from_input(input).context(ParseServiceConfigSnafu)?;

        let merged = self
            .merger
            .merge(&service_config, user_spec)
            .context(MergeConfigSnafu)?;
        let synthesis = self
            .synthesizer
            .synthesize(
                merged,
                &instance,
                &secret_reference,
                &request.observed.resources,
            )
            .context(SynthesizeResourcesSnafu)?;
        let resources = synthesis
            .desired_resources()
            .context(SynthesizeResourcesSnafu)?;

        tracing::info!(
            chart = service_config.chart.name.as_str(),
            resources = resources.len(),
            "composed resources for instance"
        );

        Ok(FunctionResponse {
            meta: ResponseMeta {
                ttl_seconds: self.response_ttl_seconds,
            },
            desired: DesiredState {
                composite: DesiredComposite {
                    connection_details: synthesis.connection_details,
                    ready: true,
                },
                resources,
            },
        })
    }
}

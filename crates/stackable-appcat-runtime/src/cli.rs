use std::path::PathBuf;

use clap::{Args, Parser, builder::RangedU64ValueParser};
use stackable_appcat::{
    function::{DEFAULT_RESPONSE_TTL_SECONDS, EngineOptions},
    labels::DEFAULT_MANAGED_BY,
    secret::DEFAULT_PASSWORD_LENGTH,
    synthesis::{ConnectionPublication, SynthesisOptions},
};

use crate::telemetry::TelemetryOptions;

/// Reads a path from stdin instead of a file.
pub const STDIN_PATH: &str = "-";

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(version, about)]
pub enum Command {
    /// Answer a single composition function request.
    Run(RunArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(long_about = "")]
pub struct RunArguments {
    /// Provides the path to the request document (YAML or JSON). Use `-` to read from stdin.
    #[arg(long, short = 'r', value_name = "FILE", default_value = STDIN_PATH, env)]
    pub request: PathBuf,

    /// Writes the response document to FILE instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE", env)]
    pub output: Option<PathBuf>,

    // IMPORTANT: All (flattened) sub structs should be placed at the end to ensure the help
    // headings are correct.
    #[command(flatten)]
    pub engine: EngineArguments,

    #[command(flatten)]
    pub telemetry: TelemetryOptions,
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(next_help_heading = "Engine Options")]
pub struct EngineArguments {
    /// Length of newly generated credentials, at least 1.
    #[arg(
        long,
        env,
        default_value_t = DEFAULT_PASSWORD_LENGTH,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub password_length: usize,

    /// Value of the `app.kubernetes.io/managed-by` label of composed resources.
    #[arg(long, env, default_value = DEFAULT_MANAGED_BY)]
    pub managed_by: String,

    /// Where rendered connection values are published.
    #[arg(long, env, value_enum, default_value_t = ConnectionPublication::default())]
    pub connection_publication: ConnectionPublication,

    /// Number of seconds the caller may cache a response.
    #[arg(long, env, default_value_t = DEFAULT_RESPONSE_TTL_SECONDS)]
    pub response_ttl_seconds: u64,
}

impl From<EngineArguments> for EngineOptions {
    fn from(arguments: EngineArguments) -> Self {
        Self {
            synthesis: SynthesisOptions {
                managed_by: arguments.managed_by,
                publication: arguments.connection_publication,
                password_length: arguments.password_length,
            },
            response_ttl_seconds: arguments.response_ttl_seconds,
        }
    }
}

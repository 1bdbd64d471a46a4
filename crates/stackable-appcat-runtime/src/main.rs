//! Answers a single AppCat composition function request.
//!
//! The request document is read from a file or stdin, the response document is
//! written to a file or stdout. Logs go to stderr.
use clap::Parser;
use snafu::{ResultExt, Snafu};
use stackable_appcat::function::{self, CompositionFunction};

use crate::{
    cli::{Command, RunArguments},
    telemetry::Tracing,
};

mod cli;
mod document;
mod telemetry;

const APP_NAME: &str = "appcat-runtime";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize tracing"))]
    InitTracing { source: telemetry::Error },

    #[snafu(display("failed to read the request"))]
    ReadRequest { source: document::Error },

    #[snafu(display("failed to run the composition function"))]
    RunFunction { source: function::Error },

    #[snafu(display("failed to write the response"))]
    WriteResponse { source: document::Error },
}

#[snafu::report]
fn main() -> Result<(), Error> {
    match Command::parse() {
        Command::Run(arguments) => run(arguments),
    }
}

fn run(arguments: RunArguments) -> Result<(), Error> {
    let RunArguments {
        request,
        output,
        engine,
        telemetry,
    } = arguments;

    // NOTE: The guard flushes buffered file logs when dropped at the end of this function
    let _tracing_guard = Tracing::pre_configured(APP_NAME, telemetry)
        .init()
        .context(InitTracingSnafu)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        request = %request.display(),
        "starting {APP_NAME}"
    );

    let request = document::read_request(&request).context(ReadRequestSnafu)?;
    let response = CompositionFunction::new(engine.into())
        .run(&request)
        .context(RunFunctionSnafu)?;
    document::write_response(&response, output.as_deref()).context(WriteResponseSnafu)?;

    tracing::info!(
        resources = response.desired.resources.len(),
        connection_details = response.desired.composite.connection_details.len(),
        "wrote response"
    );

    Ok(())
}

//! Reading requests from and writing responses to files or standard streams.
use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use snafu::{ResultExt, Snafu};
use stackable_appcat::request::{FunctionRequest, FunctionResponse};

use crate::cli::STDIN_PATH;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read request file {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to read request from stdin"))]
    ReadStdin { source: std::io::Error },

    #[snafu(display("failed to parse request document"))]
    ParseRequest { source: serde_yaml::Error },

    #[snafu(display("failed to serialize response document"))]
    SerializeResponse { source: serde_yaml::Error },

    #[snafu(display("failed to write response file {path:?}"))]
    WriteFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write response to stdout"))]
    WriteStdout { source: std::io::Error },
}

/// Reads a request document from `path`, or from stdin if `path` is `-`.
///
/// JSON is a subset of YAML, so both formats are accepted.
pub fn read_request(path: &Path) -> Result<FunctionRequest> {
    let document = if path == Path::new(STDIN_PATH) {
        let mut document = String::new();
        std::io::stdin()
            .read_to_string(&mut document)
            .context(ReadStdinSnafu)?;
        document
    } else {
        fs::read_to_string(path).context(ReadFileSnafu { path })?
    };

    parse_request(&document)
}

pub fn parse_request(document: &str) -> Result<FunctionRequest> {
    serde_yaml::from_str(document).context(ParseRequestSnafu)
}

/// Serializes `response` as an explicit YAML document.
pub fn serialize_response(response: &FunctionResponse) -> Result<Vec<u8>> {
    let mut document = b"---\n".to_vec();
    serde_yaml::to_writer(&mut document, response).context(SerializeResponseSnafu)?;
    Ok(document)
}

/// Writes `response` to `output`, or to stdout if there is none.
///
/// The document is serialized completely before anything is written.
pub fn write_response(response: &FunctionResponse, output: Option<&Path>) -> Result<()> {
    let document = serialize_response(response)?;

    match output {
        Some(path) => fs::write(path, document).context(WriteFileSnafu { path }),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&document)
                .and_then(|()| stdout.flush())
                .context(WriteStdoutSnafu)
        }
    }
}

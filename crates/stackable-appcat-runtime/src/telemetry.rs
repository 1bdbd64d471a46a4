//! Initialises the tracing subscribers of the runtime.
//!
//! Console logs are written to stderr, so they never mix with a response
//! written to stdout. File logs are optional and written as JSON by a rolling
//! file appender.
use std::path::PathBuf;

use clap::Args;
use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::Directive, layer::SubscriberExt};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender"))]
    InitRollingFileAppender { source: InitError },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: SetGlobalDefaultError },
}

/// Telemetry options, usable as CLI arguments.
#[derive(Debug, Default, PartialEq, Eq, Args)]
#[command(next_help_heading = "Telemetry Options")]
pub struct TelemetryOptions {
    /// Disable console logs.
    #[arg(long, env)]
    pub console_log_disabled: bool,

    /// Enable logging to files located in the specified DIRECTORY.
    #[arg(long, env, value_name = "DIRECTORY", group = "file_log")]
    pub file_log_directory: Option<PathBuf>,

    /// Time PERIOD after which log files are rolled over.
    #[arg(long, env, value_name = "PERIOD", requires = "file_log")]
    pub file_log_rotation_period: Option<RotationPeriod>,
}

/// Supported periods when the log file is rolled over.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "PascalCase")]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    Daily,

    #[default]
    Never,
}

impl From<RotationPeriod> for Rotation {
    fn from(value: RotationPeriod) -> Self {
        match value {
            RotationPeriod::Minutely => Self::MINUTELY,
            RotationPeriod::Hourly => Self::HOURLY,
            RotationPeriod::Daily => Self::DAILY,
            RotationPeriod::Never => Self::NEVER,
        }
    }
}

#[derive(Debug, PartialEq)]
struct LevelSettings {
    environment_variable: &'static str,
    default_level: LevelFilter,
}

#[derive(Debug, PartialEq)]
struct FileLogSettings {
    level: LevelSettings,
    directory: PathBuf,
    rotation_period: Rotation,
}

/// The configured tracing subscribers.
///
/// Buffered file logs are flushed when the guard returned by [`Tracing::init`]
/// is dropped, so it has to be held until the end of `main`. Do not bind it to
/// `_`.
#[derive(Debug)]
pub struct Tracing {
    service_name: &'static str,
    console_log_settings: Option<LevelSettings>,
    file_log_settings: Option<FileLogSettings>,

    file_log_guard: Option<WorkerGuard>,
}

impl Tracing {
    /// The environment variable used to set the console log level filter.
    pub const CONSOLE_LOG_LEVEL: &str = "CONSOLE_LOG_LEVEL";
    /// The environment variable used to set the rolling file log level filter.
    pub const FILE_LOG_LEVEL: &str = "FILE_LOG_LEVEL";
    /// The filename suffix used for the rolling file logs.
    pub const FILE_LOG_SUFFIX: &str = "tracing-rs.json";

    /// Creates a [`Tracing`] instance from CLI options.
    ///
    /// Both console and file logs default to INFO. Without a rotation period
    /// the log file is never rolled over.
    pub fn pre_configured(service_name: &'static str, options: TelemetryOptions) -> Self {
        let TelemetryOptions {
            console_log_disabled,
            file_log_directory,
            file_log_rotation_period,
        } = options;

        let console_log_settings = (!console_log_disabled).then_some(LevelSettings {
            environment_variable: Self::CONSOLE_LOG_LEVEL,
            default_level: LevelFilter::INFO,
        });
        let file_log_settings = file_log_directory.map(|directory| FileLogSettings {
            level: LevelSettings {
                environment_variable: Self::FILE_LOG_LEVEL,
                default_level: LevelFilter::INFO,
            },
            directory,
            rotation_period: file_log_rotation_period.unwrap_or_default().into(),
        });

        Self {
            service_name,
            console_log_settings,
            file_log_settings,
            file_log_guard: None,
        }
    }

    /// Installs the configured subscribers as the global default.
    pub fn init(mut self) -> Result<Self> {
        let mut layers: Vec<Box<dyn Layer<Registry> + Sync + Send>> = Vec::new();

        if let Some(settings) = &self.console_log_settings {
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter_builder(
                        settings.environment_variable,
                        settings.default_level,
                    ))
                    .boxed(),
            );
        }

        if let Some(settings) = &self.file_log_settings {
            let file_appender = RollingFileAppender::builder()
                .rotation(settings.rotation_period.clone())
                .filename_prefix(self.service_name)
                .filename_suffix(Self::FILE_LOG_SUFFIX)
                .build(&settings.directory)
                .context(InitRollingFileAppenderSnafu)?;
            let (writer, guard) = tracing_appender::non_blocking(file_appender);

            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(env_filter_builder(
                        settings.level.environment_variable,
                        settings.level.default_level,
                    ))
                    .boxed(),
            );
            self.file_log_guard = Some(guard);
        }

        if !layers.is_empty() {
            let subscriber = Registry::default().with(layers);
            tracing::subscriber::set_global_default(subscriber)
                .context(SetGlobalDefaultSubscriberSnafu)?;
        }

        Ok(self)
    }
}

/// Create an [`EnvFilter`] configured with the given environment variable and default [`Directive`].
fn env_filter_builder(env_var: &str, default_directive: impl Into<Directive>) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(env_var)
        .with_default_directive(default_directive.into())
        .from_env_lossy()
}

//! Logging Configuration and Initialization
//!
//! One `tracing` subscriber per process, writing diagnostics to the console,
//! a daily-rotated file, or both. Ingestion records (events with the
//! [`INGESTION_TARGET`] target) can additionally be split into their own
//! JSON-lines file so the per-row audit trail survives apart from the
//! diagnostic noise.
//!
//! Prefer structured fields over formatted messages:
//!
//! ```rust,ignore
//! info!(file = %file.file_name, data_map = %map.name, "Processing file");
//! error!(row = row.number, endpoint = %url, status = 400, "Target rejected row");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rowport_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> rowport_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guards = init_logging(&config)?;
//!     tracing::info!("Started");
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{filter_fn, Targets},
    fmt::MakeWriter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::error::{Result, RowportError};

/// Target of events that carry ingestion records
pub const INGESTION_TARGET: &str = "ingestion";

/// Severity, shared by diagnostics and ingestion records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const NAMES: &'static [(&'static str, LogLevel)] = &[
        ("trace", LogLevel::Trace),
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("warning", LogLevel::Warn),
        ("error", LogLevel::Error),
    ];

    /// Whether a record at `level` passes a `self` minimum
    pub fn admits(self, level: LogLevel) -> bool {
        level >= self
    }

    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Where diagnostics go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    const NAMES: &'static [(&'static str, LogOutput)] = &[
        ("console", LogOutput::Console),
        ("stdout", LogOutput::Console),
        ("file", LogOutput::File),
        ("both", LogOutput::Both),
        ("all", LogOutput::Both),
    ];

    fn console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

/// Line format of diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    const NAMES: &'static [(&'static str, LogFormat)] =
        &[("text", LogFormat::Text), ("pretty", LogFormat::Text), ("json", LogFormat::Json)];
}

/// `FromStr` and `Display` over a case-insensitive name table; the first
/// name listed for a value is its display form
macro_rules! named_choice {
    ($ty:ty, $what:literal) => {
        impl FromStr for $ty {
            type Err = RowportError;

            fn from_str(s: &str) -> Result<Self> {
                let wanted = s.trim().to_ascii_lowercase();
                <$ty>::NAMES
                    .iter()
                    .find(|(name, _)| *name == wanted)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| RowportError::config(format!("Invalid {}: {s}", $what)))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = <$ty>::NAMES
                    .iter()
                    .find(|(_, value)| value == self)
                    .map_or("", |(name, _)| *name);
                f.write_str(name)
            }
        }
    };
}

named_choice!(LogLevel, "log level");
named_choice!(LogOutput, "log output");
named_choice!(LogFormat, "log format");

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum level for diagnostics
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,
    /// Directory of rolling files
    pub log_dir: PathBuf,
    /// Diagnostic file prefix ("rowport" -> "rowport.2024-01-18")
    pub log_file_prefix: String,
    /// Extra `EnvFilter` directives, e.g. `reqwest=warn,rowport_map=debug`
    pub filter_directives: Vec<String>,
    /// Prefix of a separate JSON-lines file for ingestion records
    pub ingestion_file_prefix: Option<String>,
    pub include_location: bool,
    pub include_thread_ids: bool,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "rowport".to_string(),
            filter_directives: Vec::new(),
            ingestion_file_prefix: None,
            include_location: false,
            include_thread_ids: false,
            include_targets: true,
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(key: &str, current: bool) -> bool {
    env_value(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(current)
}

fn split_directives(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect()
}

impl LogConfig {
    /// Defaults overlaid with the `LOG_*` environment
    ///
    /// Recognised: `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`,
    /// `LOG_FILE_PREFIX`, `LOG_FILTER`, `LOG_INGESTION_FILE_PREFIX`,
    /// `LOG_INCLUDE_LOCATION`, `LOG_INCLUDE_THREAD_IDS`, `LOG_INCLUDE_TARGETS`.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay the `LOG_*` environment on this configuration
    ///
    /// A binary sets defaults from its own flags; the environment has the
    /// final word.
    pub fn merge_env(mut self) -> Result<Self> {
        if let Some(level) = env_value("LOG_LEVEL") {
            self.level = level.parse()?;
        }
        if let Some(output) = env_value("LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = env_value("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = env_value("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = env_value("LOG_FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }
        if let Some(filter) = env_value("LOG_FILTER") {
            self.filter_directives = split_directives(&filter);
        }
        if let Some(prefix) = env_value("LOG_INGESTION_FILE_PREFIX") {
            self.ingestion_file_prefix = Some(prefix);
        }
        self.include_location = env_flag("LOG_INCLUDE_LOCATION", self.include_location);
        self.include_thread_ids = env_flag("LOG_INCLUDE_THREAD_IDS", self.include_thread_ids);
        self.include_targets = env_flag("LOG_INCLUDE_TARGETS", self.include_targets);
        Ok(self)
    }

    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    fn filter(&self) -> Result<EnvFilter> {
        let mut filter =
            EnvFilter::from_default_env().add_directive(self.level.to_tracing_level().into());
        for directive in &self.filter_directives {
            let parsed = directive.parse().map_err(|e| {
                RowportError::config(format!("Invalid filter directive '{directive}': {e}"))
            })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Builder for [`LogConfig`]
#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    pub fn filter_directives(mut self, directives: &str) -> Self {
        self.config.filter_directives = split_directives(directives);
        self
    }

    pub fn ingestion_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.ingestion_file_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Flushes buffered file output when dropped; hold it until exit
#[must_use = "dropping the guards stops file logging"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber; call once at startup
pub fn init_logging(config: &LogConfig) -> Result<LogGuards> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guards = Vec::new();
    let split_ingestion = config.ingestion_file_prefix.is_some();

    if config.output.console() {
        layers.push(diagnostic_layer(config, std::io::stdout, true, split_ingestion));
    }

    if config.output.file() || split_ingestion {
        std::fs::create_dir_all(&config.log_dir).map_err(|e| {
            RowportError::config(format!(
                "Failed to create log directory {}: {e}",
                config.log_dir.display()
            ))
        })?;
    }

    if config.output.file() {
        let (writer, guard) = rolling(&config.log_dir, &config.log_file_prefix);
        guards.push(guard);
        layers.push(diagnostic_layer(config, writer, false, split_ingestion));
    }

    if let Some(prefix) = &config.ingestion_file_prefix {
        let (writer, guard) = rolling(&config.log_dir, prefix);
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(Targets::new().with_target(INGESTION_TARGET, Level::TRACE))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.filter()?)
        .try_init()
        .map_err(|e| RowportError::config(format!("Logging already initialised: {e}")))?;

    Ok(LogGuards { _guards: guards })
}

fn rolling(dir: &Path, prefix: &str) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, prefix))
}

fn diagnostic_layer<W>(config: &LogConfig, writer: W, ansi: bool, skip_ingestion: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_ansi(ansi);

    // Ingestion records have their own file when one is configured
    let keep = filter_fn(move |meta| !(skip_ingestion && meta.target() == INGESTION_TARGET));

    match config.format {
        LogFormat::Text => layer.with_filter(keep).boxed(),
        LogFormat::Json => layer.json().with_filter(keep).boxed(),
    }
}

//! Logging configuration and initialization
//!
//! All DKAN components log through `tracing`. Library code uses the
//! structured macros (`info!(plan_id = %id, "Harvest started")`); only the
//! binary installs a subscriber, via [`init_logging`].
//!
//! Supported outputs are the console, a daily rolling file, or both, in text
//! or JSON format. Settings come from a [`LogConfig`], usually built with
//! [`LogConfig::builder`] and then overridden by environment variables:
//!
//! - `LOG_LEVEL`: trace, debug, info, warn, error
//! - `LOG_OUTPUT`: console, file, both
//! - `LOG_FORMAT`: text, json
//! - `LOG_DIR`: directory for log files
//! - `LOG_FILE_PREFIX`: file name prefix (`dkan.2026-01-18`)
//! - `LOG_FILTER`: extra directives, e.g. `sqlx=warn,dkan_harvest=debug`
//!
//! # Example
//!
//! ```no_run
//! use dkan_common::logging::{init_logging, LogConfig, LogLevel};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::builder().level(LogLevel::Debug).build().merge_env()?;
//!     let _guard = init_logging(&config)?;
//!     info!("Application started");
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Implements `FromStr` for a setting enum from a list of accepted spellings
macro_rules! setting_from_str {
    ($ty:ident, $what:literal, { $($($alias:literal)|+ => $variant:ident),+ $(,)? }) => {
        impl std::str::FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($($alias)|+ => Ok($ty::$variant),)+
                    other => Err(anyhow::anyhow!("Invalid {} '{}'", $what, other)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

setting_from_str!(LogLevel, "log level", {
    "trace" => Trace,
    "debug" => Debug,
    "info" => Info,
    "warn" | "warning" => Warn,
    "error" => Error,
});

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn console(self) -> bool {
        self != LogOutput::File
    }

    fn file(self) -> bool {
        self != LogOutput::Console
    }
}

setting_from_str!(LogOutput, "log output", {
    "console" | "stdout" => Console,
    "file" => File,
    "both" | "all" => Both,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

setting_from_str!(LogFormat, "log format", {
    "text" | "pretty" => Text,
    "json" => Json,
});

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,
    /// Only used when output includes a file
    pub log_dir: PathBuf,
    pub log_file_prefix: String,
    /// Additional filter directives (e.g. "sqlx=warn")
    pub filter_directives: Option<String>,
    pub include_location: bool,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "dkan".to_string(),
            filter_directives: None,
            include_location: false,
            include_targets: true,
        }
    }
}

impl LogConfig {
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Defaults overridden by `LOG_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Apply `LOG_*` environment variables on top of this configuration
    pub fn merge_env(mut self) -> Result<Self> {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        if let Some(level) = var("LOG_LEVEL") {
            self.level = level.parse()?;
        }
        if let Some(output) = var("LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = var("LOG_DIR") {
            self.log_dir = dir.into();
        }
        self.log_file_prefix = var("LOG_FILE_PREFIX").unwrap_or(self.log_file_prefix);
        self.filter_directives = var("LOG_FILTER").or(self.filter_directives);
        if let Some(flag) = var("LOG_INCLUDE_LOCATION") {
            self.include_location = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        Ok(self)
    }
}

/// Builder for LogConfig
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

    pub fn filter_directives(mut self, filter: impl Into<String>) -> Self {
        self.config.filter_directives = Some(filter.into());
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Keeps the non-blocking file writer flushing; hold it until shutdown
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global tracing subscriber
///
/// Call once at startup and keep the returned guard alive for the lifetime
/// of the program, otherwise buffered file output is lost.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let mut filter =
        EnvFilter::from_default_env().add_directive(Level::from(config.level).into());
    if let Some(ref directives) = config.filter_directives {
        for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
            filter = filter.add_directive(
                directive
                    .trim()
                    .parse()
                    .context("Failed to parse filter directive")?,
            );
        }
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.output.console() {
        layers.push(fmt_layer(config, std::io::stdout, true));
    }

    if config.output.file() {
        std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(config, writer, false));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: guard })
}

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.include_targets)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(FmtSpan::CLOSE);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_output_flags() {
        assert!(LogOutput::Both.console() && LogOutput::Both.file());
        assert!(!LogOutput::Console.file());
        assert!(!LogOutput::File.console());
        assert_eq!("stdout".parse::<LogOutput>().unwrap(), LogOutput::Console);
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::File)
            .format(LogFormat::Json)
            .log_dir("/var/log/dkan")
            .log_file_prefix("harvest")
            .build();

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/dkan"));
        assert_eq!(config.log_file_prefix, "harvest");
    }

    #[test]
    #[serial]
    fn test_merge_env_overrides_builder() {
        std::env::set_var("LOG_LEVEL", "error");
        std::env::set_var("LOG_FORMAT", "json");

        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .build()
            .merge_env()
            .unwrap();
        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.format, LogFormat::Json);

        std::env::remove_var("LOG_LEVEL");
        std::env::remove_var("LOG_FORMAT");
    }

    #[test]
    #[serial]
    fn test_merge_env_rejects_garbage() {
        std::env::set_var("LOG_OUTPUT", "carrier-pigeon");
        assert!(LogConfig::from_env().is_err());
        std::env::remove_var("LOG_OUTPUT");
    }
}

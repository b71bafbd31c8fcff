// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging setup for the mock backend
//!
//! Every binary in the workspace initializes `tracing` through this crate so
//! that the scenario engine's events land in one consistently formatted
//! stream, whether that is a terminal, a file, or a JSON collector.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing::Level;

/// Target used by the scenario engine for its per-request activity log.
pub const SCENARIO_LOG_TARGET: &str = "test_scenarios";

/// Output format for log messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// Structured JSON format
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plaintext => write!(f, "plaintext"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plaintext" | "text" => Ok(LogFormat::Plaintext),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format: {}. Use 'plaintext' or 'json'",
                s
            )),
        }
    }
}

/// CLI log level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliLogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CliLogLevel::Error => "error",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Info => "info",
            CliLogLevel::Debug => "debug",
            CliLogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}

/// Logging flags shared by all binaries.
///
/// Use with `#[command(flatten)]`. Without `--log-file` output goes to stdout.
#[derive(Clone, Debug, Default, clap::Args, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliLoggingArgs {
    /// Log verbosity level
    #[arg(long, value_enum, help = "Log verbosity level (default: info)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<CliLogLevel>,

    /// Log output format
    #[arg(long, value_enum, help = "Log output format (default: plaintext)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    /// Append logs to this file instead of stdout
    #[arg(long, help = "Append logs to this file instead of stdout")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl CliLoggingArgs {
    /// Initialize logging from the parsed flags.
    pub fn init(self, component: &str) -> anyhow::Result<()> {
        let level: Level = self.log_level.unwrap_or_default().into();
        let format = self.log_format.unwrap_or_default();
        match self.log_file {
            Some(path) => init_to_file(component, level, format, &path),
            None => init(component, level, format),
        }
    }
}

/// Filter directive used when `RUST_LOG` is not set.
///
/// The scenario activity target is always included at the default level so
/// the per-request log is visible without extra configuration.
pub fn default_directive(component: &str, default_level: Level) -> String {
    let component = component.replace('-', "_");
    format!(
        "{level},{component}={level},{target}={level}",
        level = default_level,
        component = component,
        target = SCENARIO_LOG_TARGET
    )
}

/// Initialize logging to stdout
///
/// # Example
/// ```rust,no_run
/// use mb_logging::{init, Level, LogFormat};
///
/// fn main() -> anyhow::Result<()> {
///     init("mb-rest-server", Level::INFO, LogFormat::Plaintext)?;
///     tracing::info!("Application started");
///     Ok(())
/// }
/// ```
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stdout)
}

/// Initialize logging to a file, creating its parent directory if needed.
pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    let log_file = open_log_file(log_path)?;
    init_with_writer(component, default_level, format, log_file)
}

fn open_log_file(log_path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::OpenOptions::new().create(true).append(true).open(log_path)
}

/// Initialize logging with a custom writer
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(component, default_level)));

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).json();
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer);
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("plaintext".parse::<LogFormat>(), Ok(LogFormat::Plaintext));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn cli_log_level_maps_to_tracing_level() {
        assert_eq!(Level::from(CliLogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(CliLogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(CliLogLevel::Info), Level::INFO);
        assert_eq!(Level::from(CliLogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(CliLogLevel::Trace), Level::TRACE);
        assert_eq!(CliLogLevel::default(), CliLogLevel::Info);
        assert_eq!(CliLogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn default_directive_includes_scenario_target() {
        let directive = default_directive("mb-rest-server", Level::DEBUG);
        assert_eq!(
            directive,
            "DEBUG,mb_rest_server=DEBUG,test_scenarios=DEBUG"
        );
        // Must be accepted by EnvFilter as-is
        let _ = EnvFilter::new(directive);
    }

    #[test]
    fn log_file_parent_directories_are_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("logs").join("server.log");
        let file = open_log_file(&path).expect("open log file");
        drop(file);
        assert!(path.exists());
    }
}

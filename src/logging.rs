//! Structured logging setup using the `tracing` ecosystem.
//!
//! Installs the global `tracing-subscriber` exactly once at startup,
//! with either JSON output (for production) or pretty-printed output
//! (for TTY / local dev), written to stdout or appended to the
//! configured log file. After [`init`] returns, request handling only
//! emits events; nothing reconfigures the subscriber.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;
use crate::error::DirectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Pick the output format. Log files default to JSON; stdout defaults to
/// pretty on a terminal and JSON otherwise.
#[must_use]
pub fn resolve_format(pretty: bool, json: bool, to_file: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || (!to_file && std::io::IsTerminal::is_terminal(&std::io::stdout())) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

/// An explicit `--log-level` wins; otherwise `EnableInfoLogs` selects
/// between `info` and `error`.
#[must_use]
pub fn resolve_level(explicit: Option<LogLevel>, info_enabled: bool) -> LogLevel {
    explicit.unwrap_or(if info_enabled {
        LogLevel::Info
    } else {
        LogLevel::Error
    })
}

pub fn init(level: &LogLevel, format: LogFormat, log_file: Option<&Path>) -> Result<(), DirectorError> {
    let tracing_level = level.to_tracing_level();
    let filter = tracing_subscriber::filter::Targets::new().with_default(tracing_level);

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };
    let ansi = log_file.is_none();

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false).with_writer(writer))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_ansi(ansi).with_writer(writer))
                .init();
        }
    }

    Ok(())
}

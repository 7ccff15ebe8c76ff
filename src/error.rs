//! Unified error types for the director.
//!
//! Defines [`DirectorError`] (the main crate error enum), [`ValidationError`]
//! for config validation failures, [`InboundError`] for requests rejected
//! before forwarding, and [`ForwardError`] for a single failed call to a
//! backend. All use `thiserror` (or a manual `Display`) and carry
//! enough context to tell the operator which field or backend is at fault.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub(crate) fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DirectorError {
    #[error("No config source found.\n\n  {hint}")]
    NoConfigSource { hint: String },

    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{0}")]
    ConfigValidation(#[from] ValidationError),

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Unable to configure StatsD reporter for {addr}: {source}")]
    Metrics {
        addr: String,
        #[source]
        source: cadence::MetricError,
    },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// The inbound request cannot be forwarded at all.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InboundError {
    #[error("request body exceeds the {limit} byte limit")]
    BodyTooLarge { limit: usize },
}

/// Failure of one outbound call. Never retried.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ForwardError {
    #[error("invalid outbound request: {0}")]
    Request(#[from] http::Error),

    #[error("{}", error_chain(.0))]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("no response from primary backend within {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Render an error and all of its sources as one line.
///
/// The hyper client wraps the interesting part (e.g. "Connection refused")
/// a few levels down, so the top-level `Display` alone is not enough for
/// the 503 body.
#[must_use]
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = inner.source();
    }
    out
}

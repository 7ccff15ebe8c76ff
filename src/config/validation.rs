//! Configuration validation and primary/secondary partitioning.
//!
//! [`validate`] walks a raw [`ProxyConfig`] through a fixed sequence of
//! checks and stops at the first failure, returning a [`ValidationError`]
//! that names the offending field. On success it yields a
//! [`DirectorConfig`]: the primary backend, the secondaries, and the
//! options the rest of the process needs. That value is never mutated
//! afterwards.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use super::model::ProxyConfig;
use crate::error::ValidationError;

/// One forwarding target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub id: String,
    pub address: Url,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]:[{}]", self.id, self.address)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub file: Option<PathBuf>,
    pub info_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsOptions {
    /// StatsD `host:port`; `None` means metrics go to the no-op reporter.
    pub statsd_service: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DirectorConfig {
    pub port: u16,
    pub primary: Backend,
    pub secondaries: Vec<Backend>,
    pub log: LogOptions,
    pub metrics: MetricsOptions,
    /// `None`: wait for the primary indefinitely.
    pub response_timeout: Option<Duration>,
}

impl DirectorConfig {
    #[must_use]
    pub fn total_backends(&self) -> usize {
        self.secondaries.len() + 1
    }
}

/// Validate a single backend address. Returns the parsed URL or a
/// human-readable error.
pub fn validate_backend_url(raw: &str) -> Result<Url, String> {
    if raw.trim().is_empty() {
        return Err("does not have any associated address".into());
    }
    match Url::parse(raw) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' in '{raw}' (expected http or https)"
                ))
            } else if parsed.host_str().is_none() {
                Err(format!("'{raw}' has no host"))
            } else {
                Ok(parsed)
            }
        }
        Err(e) => Err(format!("'{raw}' is not a valid URL: {e}")),
    }
}

pub fn validate(config: Option<&ProxyConfig>) -> Result<DirectorConfig, ValidationError> {
    let Some(config) = config else {
        return Err(ValidationError::new(
            "(root)",
            "configuration for the director must be provided",
        ));
    };

    let Some(options) = config.options.as_ref() else {
        return Err(
            ValidationError::new("Options", "proxy options are missing")
                .with_suggestion("add an 'Options' block with 'Port' and 'PrimaryEndpoint'"),
        );
    };

    let port = match options.port {
        None | Some(0) => {
            return Err(ValidationError::new(
                "Options.Port",
                "proxy port is missing in proxy options",
            ))
        }
        Some(p) if p < 0 => {
            return Err(ValidationError::new(
                "Options.Port",
                format!("port must be positive, got {p}"),
            ))
        }
        Some(p) => u16::try_from(p).map_err(|_| {
            ValidationError::new("Options.Port", format!("port {p} is out of range"))
        })?,
    };

    let statsd_service = if options.enable_statsd {
        match options.statsd_service.as_deref().map(str::trim) {
            Some(addr) if !addr.is_empty() => Some(addr.to_string()),
            _ => {
                return Err(ValidationError::new(
                    "Options.StatsDService",
                    "StatsD is enabled but no service address is set",
                )
                .with_suggestion("e.g. 'StatsDService: localhost:8125'"))
            }
        }
    } else {
        None
    };

    let primary_id = match options.primary_endpoint.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => {
            return Err(ValidationError::new(
                "Options.PrimaryEndpoint",
                "primary endpoint is missing in proxy options",
            ))
        }
    };

    if config.backends.is_empty() {
        return Err(ValidationError::new(
            "Backends",
            "backends are missing or empty",
        ));
    }

    if !config.backends.contains_key(primary_id) {
        let known: Vec<&str> = config.backends.keys().map(String::as_str).collect();
        return Err(ValidationError::new(
            "Options.PrimaryEndpoint",
            format!("primary backend '{primary_id}' missing from the given set of backends"),
        )
        .with_suggestion(format!("known backends: {}", known.join(", "))));
    }

    let response_timeout = match options.response_timeout_ms {
        Some(0) => {
            return Err(ValidationError::new(
                "Options.ResponseTimeoutMs",
                "timeout must be greater than zero",
            )
            .with_suggestion("omit the option to wait for the primary indefinitely"))
        }
        other => other.map(Duration::from_millis),
    };

    let mut primary = None;
    let mut secondaries = Vec::with_capacity(config.backends.len() - 1);

    for (id, raw) in &config.backends {
        let address = validate_backend_url(raw)
            .map_err(|msg| ValidationError::new(format!("Backends.{id}"), msg))?;
        let backend = Backend {
            id: id.clone(),
            address,
        };
        if id == primary_id {
            primary = Some(backend);
        } else {
            secondaries.push(backend);
        }
    }

    // Presence of the key was checked above.
    let Some(primary) = primary else {
        return Err(ValidationError::new(
            "Options.PrimaryEndpoint",
            format!("primary backend '{primary_id}' missing from the given set of backends"),
        ));
    };

    Ok(DirectorConfig {
        port,
        primary,
        secondaries,
        log: LogOptions {
            file: options.log_file.clone(),
            info_enabled: options.enable_info_logs,
        },
        metrics: MetricsOptions { statsd_service },
        response_timeout,
    })
}

#[must_use]
pub fn format_validation_report(path: &str, config: &DirectorConfig) -> String {
    let mut lines = vec![format!(
        "  {} backends, listening on port {}\n",
        config.total_backends(),
        config.port
    )];

    lines.push(format!(
        "  primary    {}  -> {}",
        config.primary.id, config.primary.address
    ));
    for backend in &config.secondaries {
        lines.push(format!("  secondary  {}  -> {}", backend.id, backend.address));
    }

    let timeout = config.response_timeout.map_or_else(
        || "none (wait for primary)".to_string(),
        |t| format!("{}ms", t.as_millis()),
    );
    lines.push(format!("\n  response timeout: {timeout}"));
    lines.push(format!(
        "  statsd: {}",
        config.metrics.statsd_service.as_deref().unwrap_or("disabled")
    ));

    format!("{} is valid\n{}", path, lines.join("\n"))
}

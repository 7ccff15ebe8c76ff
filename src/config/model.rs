//! Serde data structures for the director configuration file.
//!
//! [`ProxyConfig`] is the document root as written by the operator; it is
//! only a carrier for raw values. The validated, immutable form is
//! [`DirectorConfig`](super::validation::DirectorConfig). Keys are
//! PascalCase and unknown keys are rejected.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    #[serde(rename = "Options", default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ProxyOptions>,

    /// Backend id to base URL.
    #[serde(rename = "Backends", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub backends: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyOptions {
    /// Kept signed so that a negative port is reported by validation
    /// rather than as an opaque parse error.
    #[serde(rename = "Port", default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,

    #[serde(
        rename = "PrimaryEndpoint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_endpoint: Option<String>,

    #[serde(rename = "LogFile", default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    #[serde(rename = "EnableInfoLogs", default, skip_serializing_if = "is_false")]
    pub enable_info_logs: bool,

    #[serde(rename = "EnableStatsD", default, skip_serializing_if = "is_false")]
    pub enable_statsd: bool,

    #[serde(
        rename = "StatsDService",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub statsd_service: Option<String>,

    #[serde(
        rename = "ResponseTimeoutMs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub response_timeout_ms: Option<u64>,
}

impl ProxyConfig {
    /// Minimal valid config with `primary` as the primary backend.
    #[must_use]
    pub fn new(port: u16, primary: &str, backends: BTreeMap<String, String>) -> Self {
        Self {
            options: Some(ProxyOptions {
                port: Some(i64::from(port)),
                primary_endpoint: Some(primary.to_string()),
                ..ProxyOptions::default()
            }),
            backends,
        }
    }
}

//! Configuration loading and validation.
//!
//! The config is read exactly once at startup: [`load_file`] reads a
//! YAML, JSON, or TOML document (by extension, gated by feature flags)
//! into a raw [`ProxyConfig`], and [`validation::validate`] turns it into
//! the immutable [`DirectorConfig`](validation::DirectorConfig).

pub mod model;
pub mod validation;

use std::path::Path;

use crate::error::DirectorError;
use model::ProxyConfig;

/// File names probed in the working directory when no path is given.
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "director.yaml",
    "director.yml",
    "director.json",
    "director.toml",
];

/// Parse a config string based on file extension.
///
/// An empty document (or an explicit `null`) yields `Ok(None)` so that
/// validation can report the missing configuration itself.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Option<ProxyConfig>, DirectorError> {
    let parse_err = |e: Box<dyn std::error::Error + Send + Sync>| DirectorError::ConfigParse {
        path: path_display.to_string(),
        source: e,
    };

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => {
            if is_blank_yaml(content) {
                return Ok(None);
            }
            serde_yml::from_str(content).map_err(|e| parse_err(Box::new(e)))
        }

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| parse_err(Box::new(e))),

        #[cfg(feature = "toml")]
        "toml" => {
            if content.trim().is_empty() {
                return Ok(None);
            }
            toml::from_str(content)
                .map(Some)
                .map_err(|e| parse_err(Box::new(e)))
        }

        other => Err(DirectorError::UnsupportedFormat(other.to_string())),
    }
}

/// Read and parse a config file. Validation is left to the caller.
pub async fn load_file(path: &Path) -> Result<Option<ProxyConfig>, DirectorError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DirectorError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            DirectorError::Io(e)
        }
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    parse_config_str(ext, &content, &path.display().to_string())
}

#[cfg(feature = "yaml")]
fn is_blank_yaml(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#') || line == "---")
}

//! `director init`: generate a starter configuration file.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::error::DirectorError;

pub fn execute(args: &InitArgs) -> Result<(), DirectorError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("director.{}", args.format.extension())));

    if output.exists() {
        return Err(DirectorError::FileExists { path: output });
    }

    std::fs::write(&output, template(&args.format))?;
    println!("Created {}", output.display());
    Ok(())
}

#[must_use]
pub const fn template(format: &ConfigFormat) -> &'static str {
    match format {
        ConfigFormat::Yaml => YAML_TEMPLATE,
        ConfigFormat::Json => JSON_TEMPLATE,
        ConfigFormat::Toml => TOML_TEMPLATE,
    }
}

const YAML_TEMPLATE: &str = r"# director config
#
# The primary's response is returned to callers. Every other backend
# receives a copy of each request; its response is discarded.

Options:
  Port: 9090
  PrimaryEndpoint: current
  # LogFile: /var/log/director.log
  # EnableInfoLogs: true
  # EnableStatsD: true
  # StatsDService: localhost:8125
  # ResponseTimeoutMs: 5000     # omit to wait for the primary indefinitely

Backends:
  current: http://localhost:8080
  candidate: http://localhost:8081
";

const JSON_TEMPLATE: &str = r#"{
  "Options": {
    "Port": 9090,
    "PrimaryEndpoint": "current"
  },
  "Backends": {
    "current": "http://localhost:8080",
    "candidate": "http://localhost:8081"
  }
}
"#;

const TOML_TEMPLATE: &str = r#"# director config

[Options]
Port = 9090
PrimaryEndpoint = "current"
# LogFile = "/var/log/director.log"
# EnableInfoLogs = true
# EnableStatsD = true
# StatsDService = "localhost:8125"
# ResponseTimeoutMs = 5000

[Backends]
current = "http://localhost:8080"
candidate = "http://localhost:8081"
"#;

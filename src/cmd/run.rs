//! `director run`: start the proxy server.
//!
//! Loads and validates the configuration, installs logging, builds the
//! [`Director`](crate::server::Director) and serves the catch-all router
//! until Ctrl+C / SIGTERM.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::RunArgs;
use crate::config::{self, validation, DEFAULT_CANDIDATES};
use crate::error::DirectorError;
use crate::logging;
use crate::server::{self, Director};

pub async fn execute(args: RunArgs) -> Result<(), DirectorError> {
    let path = resolve_config_path(args.config.as_deref()).await?;
    let raw = config::load_file(&path).await?;

    // Validation runs before logging is configured, since the log options
    // live in the config itself.
    let validated = validation::validate(raw.as_ref())?;

    let level = logging::resolve_level(args.log_level.clone(), validated.log.info_enabled);
    let log_format =
        logging::resolve_format(args.pretty, args.json, validated.log.file.is_some());
    logging::init(&level, log_format, validated.log.file.as_deref())?;

    let director = Director::from_validated(validated)?.with_max_body(args.max_body);
    let port = args.port.unwrap_or(director.config.port);
    let primary = director.config.primary.to_string();
    let secondaries = director.config.secondaries.len();

    let router = server::build_router(Arc::new(director));

    let addr: SocketAddr = format!("{}:{}", args.host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        config = %path.display(),
        primary = %primary,
        secondaries,
        "director started"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(server::shutdown_signal())
        .await?;

    tracing::info!("director stopped");
    Ok(())
}

async fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, DirectorError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    for name in DEFAULT_CANDIDATES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }
    }

    Err(DirectorError::NoConfigSource {
        hint: "Provide --config <file> or create ./director.yaml.\n  \
               Run 'director init' to create a config file."
            .into(),
    })
}

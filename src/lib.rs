//! Director is an HTTP traffic-shadowing reverse proxy.
//!
//! Every inbound request is forwarded to one primary backend, whose
//! response is returned to the caller verbatim. The same request is then
//! replayed to each secondary backend on a fire-and-forget basis: their
//! responses are drained and discarded, and their failures never reach
//! the caller. Outcomes and latencies are reported through the
//! [`Reporter`](metrics::Reporter) trait.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate).
//! - [`config`] -- Config file loading and validation into an immutable
//!   [`DirectorConfig`](config::validation::DirectorConfig).
//! - [`error`] -- Error types using `thiserror`.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`metrics`] -- The `Reporter` trait with no-op and StatsD implementations.
//! - [`proxy`] -- Request buffering, header sanitization, primary forwarding
//!   and secondary fan-out.
//! - [`server`] -- Axum server setup, shared director state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod proxy;
pub mod server;

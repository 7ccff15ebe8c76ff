//! Pluggable metrics reporting.
//!
//! The dispatch engine only talks to the [`Reporter`] trait. Two
//! implementations ship with the crate: [`NoopReporter`] (the default)
//! and [`StatsdReporter`], a `cadence` StatsD client over UDP. Anything
//! else (a counting reporter in tests, a bridge to another metrics
//! system) can be injected with
//! [`Director::with_reporter`](crate::server::Director::with_reporter).
//!
//! Reporters are shared by every request task at once, so implementations
//! must synchronise their own state.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use cadence::prelude::*;
use cadence::{MetricResult, StatsdClient, UdpMetricSink};

use crate::error::DirectorError;

pub const REQUEST_COUNT: &str = "director.request.count";

/// Which leg of the fan-out a call belongs to. Used as the metric prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    #[must_use]
    pub fn success_tag(self) -> String {
        format!("{}.success.count", self.as_str())
    }

    #[must_use]
    pub fn failure_tag(self) -> String {
        format!("{}.failure.count", self.as_str())
    }

    #[must_use]
    pub fn timeout_tag(self) -> String {
        format!("{}.timeout.count", self.as_str())
    }

    #[must_use]
    pub fn response_time_tag(self) -> String {
        format!("{}.response_time", self.as_str())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle pairing a `start_timing` call with its `end_timing`.
#[derive(Debug)]
#[must_use = "a timing context must be passed to end_timing"]
pub struct TimingContext {
    started: Option<Instant>,
}

impl TimingContext {
    pub fn started() -> Self {
        Self {
            started: Some(Instant::now()),
        }
    }

    /// A context for reporters that do not record timings.
    pub const fn disabled() -> Self {
        Self { started: None }
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.started.map(|s| s.elapsed())
    }
}

pub trait Reporter: Send + Sync {
    fn increment(&self, tag: &str);
    fn gauge(&self, tag: &str, value: u64);
    fn count(&self, tag: &str, value: u64);
    fn start_timing(&self) -> TimingContext;
    fn end_timing(&self, timing: TimingContext, tag: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn increment(&self, _tag: &str) {}
    fn gauge(&self, _tag: &str, _value: u64) {}
    fn count(&self, _tag: &str, _value: u64) {}
    fn start_timing(&self) -> TimingContext {
        TimingContext::disabled()
    }
    fn end_timing(&self, _timing: TimingContext, _tag: &str) {}
}

/// StatsD adapter over a `cadence` client writing to a non-blocking UDP
/// sink.
///
/// Every metric is prefixed with `director.`; send failures go to the
/// client's error handler, which logs and drops them so that metrics can
/// never fail a request.
pub struct StatsdReporter {
    client: StatsdClient,
}

impl std::fmt::Debug for StatsdReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsdReporter").finish_non_exhaustive()
    }
}

impl StatsdReporter {
    pub const DEFAULT_PREFIX: &'static str = "director";

    pub fn new(addr: &str) -> Result<Self, DirectorError> {
        Self::with_prefix(addr, Self::DEFAULT_PREFIX)
    }

    pub fn with_prefix(addr: &str, prefix: &str) -> Result<Self, DirectorError> {
        let sink = || -> MetricResult<UdpMetricSink> {
            let socket = UdpSocket::bind("0.0.0.0:0")?;
            socket.set_nonblocking(true)?;
            UdpMetricSink::from(addr, socket)
        };
        let sink = sink().map_err(|source| DirectorError::Metrics {
            addr: addr.to_string(),
            source,
        })?;

        let client = StatsdClient::builder(prefix, sink)
            .with_error_handler(|e| tracing::warn!(error = %e, "statsd send failed"))
            .build();
        Ok(Self { client })
    }
}

impl Reporter for StatsdReporter {
    fn increment(&self, tag: &str) {
        self.client.incr_with_tags(tag).send();
    }

    fn gauge(&self, tag: &str, value: u64) {
        self.client.gauge_with_tags(tag, value).send();
    }

    fn count(&self, tag: &str, value: u64) {
        let value = i64::try_from(value).unwrap_or(i64::MAX);
        self.client.count_with_tags(tag, value).send();
    }

    fn start_timing(&self) -> TimingContext {
        TimingContext::started()
    }

    fn end_timing(&self, timing: TimingContext, tag: &str) {
        if let Some(elapsed) = timing.elapsed() {
            self.client.time_with_tags(tag, elapsed).send();
        }
    }
}

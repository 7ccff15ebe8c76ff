//! Backend invocation and the fire-and-forget secondary fan-out.
//!
//! [`invoke`] performs exactly one call to one backend and reports its
//! timing and outcome. [`dispatch_secondaries`] spawns one detached task
//! per secondary backend; those tasks drain and discard the response and
//! are never joined, so their latency and failures stay invisible to the
//! caller.
//!
//! **Shutdown behavior:** secondary tasks may be cancelled by the Tokio
//! runtime during graceful shutdown. Their results are best-effort.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use tracing::Instrument;

use super::headers;
use super::RequestEnvelope;
use crate::config::validation::Backend;
use crate::error::ForwardError;
use crate::metrics::{Reporter, Role};
use crate::server::{Director, HttpClient};

/// One outbound call. No retry: a failure is final for this backend and
/// this request.
///
/// The timing span is always closed before returning. With a `deadline`,
/// the call is abandoned once it elapses without response headers.
pub async fn invoke(
    client: &HttpClient,
    request: Request<Full<Bytes>>,
    backend: &Backend,
    reporter: &dyn Reporter,
    role: Role,
    deadline: Option<Duration>,
) -> Result<Response<Incoming>, ForwardError> {
    let timing = reporter.start_timing();
    let call = client.request(request);

    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome.map_err(ForwardError::from),
            Err(_) => Err(ForwardError::Timeout {
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
        },
        None => call.await.map_err(ForwardError::from),
    };

    reporter.end_timing(timing, &role.response_time_tag());

    match &result {
        Ok(response) => {
            reporter.increment(&role.success_tag());
            tracing::info!(
                role = %role,
                backend = %backend,
                status = response.status().as_u16(),
                "received response"
            );
        }
        Err(e @ ForwardError::Timeout { .. }) => {
            // Counted as a failure as well.
            reporter.increment(&role.timeout_tag());
            reporter.increment(&role.failure_tag());
            tracing::error!(role = %role, backend = %backend, error = %e, "backend timed out");
        }
        Err(e) => {
            reporter.increment(&role.failure_tag());
            tracing::error!(role = %role, backend = %backend, error = %e, "error response");
        }
    }

    result
}

/// Sanitize a clone of `envelope` for `backend` and invoke it.
pub async fn forward(
    director: &Director,
    envelope: &RequestEnvelope,
    backend: &Backend,
    role: Role,
    deadline: Option<Duration>,
) -> Result<Response<Incoming>, ForwardError> {
    let request = match headers::sanitize(envelope, &backend.address) {
        Ok(request) => request,
        Err(e) => {
            director.reporter.increment(&role.failure_tag());
            tracing::error!(role = %role, backend = %backend, error = %e, "failed to build request");
            return Err(e);
        }
    };

    tracing::info!(role = %role, backend = %backend.id, uri = %request.uri(), "sending request");

    invoke(
        &director.http_client,
        request,
        backend,
        director.reporter.as_ref(),
        role,
        deadline,
    )
    .await
}

/// Spawn one detached replay per secondary backend. Returns the number
/// of tasks launched.
pub fn dispatch_secondaries(director: &Arc<Director>, envelope: &Arc<RequestEnvelope>) -> usize {
    for backend in &director.config.secondaries {
        let director = Arc::clone(director);
        let envelope = Arc::clone(envelope);
        let backend = backend.clone();

        tokio::spawn(
            async move {
                replay(&director, &envelope, &backend).await;
            }
            .instrument(tracing::Span::current()),
        );
    }
    director.config.secondaries.len()
}

async fn replay(director: &Director, envelope: &RequestEnvelope, backend: &Backend) {
    let Ok(response) = forward(director, envelope, backend, Role::Secondary, None).await else {
        // Already logged and counted.
        return;
    };

    let status = response.status();
    let mut body = response.into_body();
    let mut drained = 0usize;
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => drained += frame.data_ref().map_or(0, Bytes::len),
            Err(e) => {
                tracing::warn!(backend = %backend, error = %e, "failed to drain secondary response");
                return;
            }
        }
    }
    tracing::debug!(
        backend = %backend,
        status = status.as_u16(),
        bytes = drained,
        "secondary response discarded"
    );
}

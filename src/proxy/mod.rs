//! Core HTTP request dispatch.
//!
//! The [`forward_handler`] function is the Axum fallback that receives
//! every request. It buffers the body once, then hands off to a spawned
//! task that forwards a clone to the primary backend and afterwards
//! launches the secondary replays without waiting for them. The handler
//! only waits for the primary's result. Submodules handle outbound request
//! construction ([`headers`]), backend calls and fan-out ([`fanout`]),
//! and streaming the primary's response back ([`response`]).

pub mod fanout;
pub mod headers;
pub mod response;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use tracing::Instrument;

use crate::error::{ForwardError, InboundError};
use crate::metrics::{self, Role};
use crate::server::Director;

/// The inbound request with its body fully read. Shared read-only by the
/// primary call and every secondary task.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestEnvelope {
    /// Read the whole body, up to `limit` bytes. Going over the limit
    /// rejects the request, whether or not a `Content-Length` was sent.
    /// Any other read error is logged and the request goes on with an
    /// empty body.
    pub async fn buffer(request: Request, limit: usize) -> Result<Self, InboundError> {
        let (parts, body) = request.into_parts();
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(InboundError::BodyTooLarge { limit });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to read request body, forwarding without it");
                Bytes::new()
            }
        };
        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        })
    }
}

pub async fn forward_handler(State(director): State<Arc<Director>>, request: Request) -> Response {
    let request_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    let span = tracing::info_span!("request", request_id = %request_id);
    dispatch(director, request).instrument(span).await
}

async fn dispatch(director: Arc<Director>, request: Request) -> Response {
    director.reporter.increment(metrics::REQUEST_COUNT);

    let envelope = match RequestEnvelope::buffer(request, director.max_body).await {
        Ok(envelope) => Arc::new(envelope),
        Err(e) => {
            tracing::error!(error = %e, "request rejected before forwarding");
            return (StatusCode::PAYLOAD_TOO_LARGE, format!("{e}\n")).into_response();
        }
    };
    tracing::info!(
        method = %envelope.method,
        uri = %envelope.uri,
        bytes = envelope.body.len(),
        secondaries = director.config.secondaries.len(),
        "request received"
    );

    // Hyper drops this future when the caller hangs up. The backend legs
    // run in their own task so that they still complete and get metered.
    let legs = tokio::spawn(
        primary_then_secondaries(Arc::clone(&director), envelope)
            .instrument(tracing::Span::current()),
    );

    match legs.await {
        Ok(Ok(backend_response)) => response::assemble(backend_response),
        Ok(Err(e @ ForwardError::Timeout { .. })) => {
            (StatusCode::GATEWAY_TIMEOUT, format!("{e}\n")).into_response()
        }
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("{e}\n")).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "primary task failed");
            (StatusCode::SERVICE_UNAVAILABLE, format!("{e}\n")).into_response()
        }
    }
}

/// Forward to the primary, then launch the secondary replays whatever the
/// primary's outcome.
async fn primary_then_secondaries(
    director: Arc<Director>,
    envelope: Arc<RequestEnvelope>,
) -> Result<hyper::Response<Incoming>, ForwardError> {
    let outcome = fanout::forward(
        &director,
        &envelope,
        &director.config.primary,
        Role::Primary,
        director.config.response_timeout,
    )
    .await;

    fanout::dispatch_secondaries(&director, &envelope);

    outcome
}

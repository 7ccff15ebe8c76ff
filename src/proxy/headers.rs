//! Outbound request construction: URL rewriting and hop-by-hop stripping.
//!
//! [`sanitize`] turns the buffered inbound request into a request aimed
//! at one backend. Every call works on its own copy of the header map,
//! so clones for the primary and for each secondary never share mutable
//! state with each other or with the inbound request.

use std::sync::LazyLock;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use bytes::Bytes;
use http_body_util::Full;
use url::Url;

use super::RequestEnvelope;
use crate::error::ForwardError;

/// RFC 2616 §13.5.1 plus the non-standard `Proxy-Connection` still sent by
/// some clients.
static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "proxy-connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Build the outbound clone of `envelope` for the backend at `target`.
pub fn sanitize(envelope: &RequestEnvelope, target: &Url) -> Result<Request<Full<Bytes>>, ForwardError> {
    let mut headers = envelope.headers.clone();

    if !headers.contains_key(header::USER_AGENT) {
        // Keep the client library from filling in its own.
        headers.insert(header::USER_AGENT, HeaderValue::from_static(""));
    }

    // Derived from the new URI by the client.
    headers.remove(header::HOST);

    strip_hop_by_hop(&mut headers);

    let had_length = headers.remove(header::CONTENT_LENGTH).is_some();
    if had_length || !envelope.body.is_empty() {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(envelope.body.len()));
    }

    let uri = target_uri(target, envelope.uri.path(), envelope.uri.query());

    let mut request = Request::builder()
        .method(envelope.method.clone())
        .uri(uri)
        .body(Full::new(envelope.body.clone()))?;
    *request.headers_mut() = headers;
    Ok(request)
}

/// Remove hop-by-hop headers, including any header named in `Connection`.
///
/// The `Connection` tokens are read before the fixed list is removed,
/// since `Connection` itself is on that list.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .filter_map(|f| f.parse::<HeaderName>().ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// Join two path segments with exactly one `/` at the seam.
#[must_use]
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

/// Merge the target's query with the request's; `&`-joined when both are set.
#[must_use]
pub fn join_query(target: &str, request: &str) -> String {
    if target.is_empty() || request.is_empty() {
        format!("{target}{request}")
    } else {
        format!("{target}&{request}")
    }
}

/// Absolute URI for the request `path`/`query` rebased onto `target`.
#[must_use]
pub fn target_uri(target: &Url, path: &str, query: Option<&str>) -> String {
    let authority = &target[url::Position::BeforeHost..url::Position::AfterPort];
    let path = single_joining_slash(target.path(), path);
    let query = join_query(target.query().unwrap_or(""), query.unwrap_or(""));

    if query.is_empty() {
        format!("{}://{authority}{path}", target.scheme())
    } else {
        format!("{}://{authority}{path}?{query}", target.scheme())
    }
}

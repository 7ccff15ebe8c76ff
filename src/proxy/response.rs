//! Response assembly: copy the primary's response to the caller.
//!
//! Status and headers are copied as-is (multi-value headers included).
//! The body is never buffered: [`CopyBody`] re-frames it into chunks of
//! at most [`COPY_BUFFER_SIZE`] bytes as it arrives, and if the backend
//! stream fails part-way the error text is appended to what was already
//! sent, since status and headers are committed by then.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};

pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Build the caller-facing response from a backend response.
pub fn assemble<B>(backend: http::Response<B>) -> Response
where
    B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
    B::Error: std::fmt::Display,
{
    let (parts, body) = backend.into_parts();

    let mut builder = Response::builder().status(parts.status);
    if let Some(headers) = builder.headers_mut() {
        for (key, value) in &parts.headers {
            headers.append(key, value.clone());
        }
    }

    let body = Body::new(CopyBody::new(body));
    builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to build caller response");
        let mut response = Response::new(Body::from(format!("{e}\n")));
        *response.status_mut() = http::StatusCode::BAD_GATEWAY;
        response
    })
}

/// Body adapter that yields at most `COPY_BUFFER_SIZE` bytes per frame
/// and turns a mid-stream error into a trailing plain-text chunk.
pub struct CopyBody<B> {
    inner: B,
    pending: Bytes,
    finished: bool,
}

impl<B> CopyBody<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            pending: Bytes::new(),
            finished: false,
        }
    }

    fn next_chunk(&mut self) -> Frame<Bytes> {
        let take = self.pending.len().min(COPY_BUFFER_SIZE);
        Frame::data(self.pending.split_to(take))
    }
}

impl<B> HttpBody for CopyBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if !self.pending.is_empty() {
            return Poll::Ready(Some(Ok(self.next_chunk())));
        }
        if self.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                Ok(data) => {
                    self.pending = data;
                    Poll::Ready(Some(Ok(self.next_chunk())))
                }
                // Trailers pass through untouched.
                Err(frame) => Poll::Ready(Some(Ok(frame))),
            },
            Poll::Ready(Some(Err(e))) => {
                tracing::error!(error = %e, "error while copying primary response body");
                self.finished = true;
                Poll::Ready(Some(Ok(Frame::data(Bytes::from(format!("{e}\n"))))))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.pending.is_empty() && (self.finished || self.inner.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        let mut hint = self.inner.size_hint();
        let pending = self.pending.len() as u64;
        hint.set_lower(hint.lower() + pending);
        if let Some(upper) = hint.upper() {
            hint.set_upper(upper + pending);
        }
        hint
    }
}

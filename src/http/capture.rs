//! Request and response body capture.
//!
//! # Responsibilities
//! - Buffer small request bodies and hand the application an identical copy
//! - Tee response bodies to the client while keeping a bounded copy
//! - Report what was captured once the response stream finishes or is dropped
//!
//! # Design Decisions
//! - Requests are only buffered when `Content-Length` is known and within the limit;
//!   anything else passes through untouched and capture is `Unavailable`
//! - A request read error is replayed to the application as the same error
//! - The response tap reports from `Drop`, so a client that disconnects mid-stream
//!   still produces records from whatever was seen
//! - Response trailers are not forwarded through the tap

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, Response};
use futures_util::stream::{self, StreamExt};

/// Result of trying to capture a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(Bytes),
    Unavailable(Unavailable),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    UnknownLength,
    TooLarge { length: u64, limit: usize },
    ReadFailed(String),
}

/// Declared `Content-Length`, if present and well formed.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Buffer the request body when it is small enough, returning a request whose
/// body reads back the same bytes.
pub async fn capture_request(req: Request<Body>, limit: usize) -> (Request<Body>, CaptureOutcome) {
    let length = match content_length(req.headers()) {
        Some(length) => length,
        None => return (req, CaptureOutcome::Unavailable(Unavailable::UnknownLength)),
    };
    if length > limit as u64 {
        return (
            req,
            CaptureOutcome::Unavailable(Unavailable::TooLarge { length, limit }),
        );
    }

    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => (
            Request::from_parts(parts, Body::from(bytes.clone())),
            CaptureOutcome::Captured(bytes),
        ),
        Err(e) => {
            let reason = e.to_string();
            tracing::debug!(error = %reason, "Request body read failed during capture");
            let replay = Body::from_stream(stream::once(async move { Err::<Bytes, _>(e) }));
            (
                Request::from_parts(parts, replay),
                CaptureOutcome::Unavailable(Unavailable::ReadFailed(reason)),
            )
        }
    }
}

/// What the response tap saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedResponse {
    /// Leading bytes of the body, at most the configured limit.
    pub body: Bytes,
    /// Bytes forwarded to the client.
    pub total_bytes: u64,
    /// The stream ran to its end.
    pub complete: bool,
    pub stream_error: Option<String>,
}

type OnDone = Box<dyn FnOnce(CapturedResponse) + Send + 'static>;

struct Tap {
    buf: Vec<u8>,
    limit: usize,
    total: u64,
    complete: bool,
    error: Option<String>,
    on_done: Option<OnDone>,
}

impl Tap {
    fn observe(&mut self, chunk: &Bytes) {
        self.total += chunk.len() as u64;
        let room = self.limit.saturating_sub(self.buf.len());
        if room > 0 {
            self.buf.extend_from_slice(&chunk[..room.min(chunk.len())]);
        }
    }
}

impl Drop for Tap {
    fn drop(&mut self) {
        if let Some(on_done) = self.on_done.take() {
            on_done(CapturedResponse {
                body: Bytes::from(std::mem::take(&mut self.buf)),
                total_bytes: self.total,
                complete: self.complete,
                stream_error: self.error.take(),
            });
        }
    }
}

/// Forward the response body unchanged while copying up to `limit` bytes.
///
/// `on_done` runs exactly once: at end of stream, or when the body is dropped.
pub fn tap_response<F>(response: Response<Body>, limit: usize, on_done: F) -> Response<Body>
where
    F: FnOnce(CapturedResponse) + Send + 'static,
{
    let (parts, body) = response.into_parts();
    let tap = Tap {
        buf: Vec::new(),
        limit,
        total: 0,
        complete: false,
        error: None,
        on_done: Some(Box::new(on_done)),
    };

    let frames = stream::unfold(
        (body.into_data_stream(), tap),
        |(mut inner, mut tap)| async move {
            match inner.next().await {
                Some(Ok(chunk)) => {
                    tap.observe(&chunk);
                    Some((Ok(chunk), (inner, tap)))
                }
                Some(Err(e)) => {
                    tap.error = Some(e.to_string());
                    Some((Err(e), (inner, tap)))
                }
                None => {
                    tap.complete = true;
                    None
                }
            }
        },
    );

    Response::from_parts(parts, Body::from_stream(frames))
}

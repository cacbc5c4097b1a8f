//! Response translation.
//!
//! # Responsibilities
//! - Copy status and every header from the application's response
//! - Re-serialize the body according to its content type
//! - Tie the request's spool guard to the outgoing body
//!
//! # Design Decisions
//! - Bodies are read fully before the head is written, so framing headers
//!   (`Content-Length`, `Transfer-Encoding`) are recomputed by the server
//! - A failure reading the application's body aborts the connection rather
//!   than sending a truncated success

use std::io;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap},
    response::Response,
};
use futures_util::stream::{self, StreamExt};

use crate::http::canonical::{collect, CanonicalResponse};
use crate::ingest::{kind::media_type, SpoolGuard};

/// How the outgoing body is re-serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseKind {
    Json,
    Text,
    Binary,
}

impl ResponseKind {
    fn of(headers: &HeaderMap) -> Self {
        let essence = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();

        if essence == "application/json" || essence.ends_with("+json") {
            ResponseKind::Json
        } else if essence.starts_with("text/") || essence == "application/xml" || essence.ends_with("+xml") {
            ResponseKind::Text
        } else {
            ResponseKind::Binary
        }
    }
}

/// Turn the application's response into the outgoing axum response.
pub async fn translate(res: CanonicalResponse, guard: Option<SpoolGuard>) -> Response {
    let CanonicalResponse { status, headers, body } = res;
    let kind = ResponseKind::of(&headers);

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    for (name, value) in &headers {
        if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }

    let Some(body) = body else {
        *response.body_mut() = guarded(None, guard);
        return response;
    };

    let bytes = match collect(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(status = status.as_u16(), error = %e, "Application response body failed");
            *response.body_mut() = aborted(e, guard);
            return response;
        }
    };

    let bytes = match kind {
        ResponseKind::Json => reencode_json(bytes),
        ResponseKind::Text => {
            if let Err(e) = std::str::from_utf8(&bytes) {
                tracing::debug!(valid_up_to = e.valid_up_to(), "Text response is not UTF-8; passing bytes through");
            }
            bytes
        }
        ResponseKind::Binary => bytes,
    };
    *response.body_mut() = guarded(Some(bytes), guard);
    response
}

/// Normalize JSON through serde. Unparseable JSON goes out as-is.
fn reencode_json(bytes: Bytes) -> Bytes {
    if bytes.is_empty() {
        return bytes;
    }
    let value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, bytes = bytes.len(), "Response declared JSON but did not parse");
            return bytes;
        }
    };
    match serde_json::to_vec(&value) {
        Ok(out) => Bytes::from(out),
        Err(_) => bytes,
    }
}

/// A body that owns `guard` until the server drops it: after the last byte
/// is written, or when the client goes away.
fn guarded(bytes: Option<Bytes>, guard: Option<SpoolGuard>) -> Body {
    let Some(guard) = guard else {
        return bytes.map(Body::from).unwrap_or_else(Body::empty);
    };
    let chunks: Vec<io::Result<Bytes>> = bytes.into_iter().map(Ok).collect();
    Body::from_stream(stream::iter(chunks).map(move |chunk| {
        let _held = &guard;
        chunk
    }))
}

fn aborted(error: io::Error, guard: Option<SpoolGuard>) -> Body {
    Body::from_stream(stream::once(async move {
        drop(guard);
        Err::<Bytes, io::Error>(error)
    }))
}

//! Framework-neutral request and response shapes.
//!
//! These are what the application's `fetch` entry point consumes and
//! produces. They carry no axum types beyond the shared `http` primitives.

use std::io;
use std::pin::Pin;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

/// A streamed body.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Request body as materialized by the ingestion pipeline.
pub enum CanonicalBody {
    Text(String),
    Bytes(Bytes),
    Stream(BodyStream),
}

impl CanonicalBody {
    pub fn stream<S>(s: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        CanonicalBody::Stream(Box::pin(s))
    }

    /// Read the whole body into memory.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self {
            CanonicalBody::Text(s) => Ok(Bytes::from(s)),
            CanonicalBody::Bytes(b) => Ok(b),
            CanonicalBody::Stream(s) => collect(s).await,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, CanonicalBody::Stream(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CanonicalBody::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Debug for CanonicalBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanonicalBody::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            CanonicalBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            CanonicalBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// The request handed to the application.
#[derive(Debug)]
pub struct CanonicalRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<CanonicalBody>,
    /// Set whenever a body is attached; streamed bodies require half-duplex
    /// transport semantics on the fetch side.
    pub duplex: bool,
}

impl CanonicalRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            duplex: false,
        }
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Consume the body as bytes. Absent bodies read as empty.
    pub async fn bytes(&mut self) -> io::Result<Bytes> {
        match self.body.take() {
            Some(body) => body.into_bytes().await,
            None => Ok(Bytes::new()),
        }
    }

    pub async fn text(&mut self) -> io::Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub async fn json<T: DeserializeOwned>(&mut self) -> io::Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// The response returned by the application.
pub struct CanonicalResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<BodyStream>,
}

impl CanonicalResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let bytes = body.into();
        self.body = Some(Box::pin(stream::once(async move { Ok::<_, io::Error>(bytes) })));
        self
    }

    pub fn with_stream<S>(mut self, s: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.body = Some(Box::pin(s));
        self
    }

    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .with_body(body),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize JSON response");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(status)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .with_body(body)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Read the whole body into memory.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self.body {
            Some(s) => collect(s).await,
            None => Ok(Bytes::new()),
        }
    }
}

impl std::fmt::Debug for CanonicalResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body.is_some())
            .finish()
    }
}

pub(crate) async fn collect(s: BodyStream) -> io::Result<Bytes> {
    let chunks: Vec<Bytes> = s.try_collect().await?;
    if chunks.len() == 1 {
        return Ok(chunks.into_iter().next().unwrap_or_default());
    }
    let mut out = Vec::with_capacity(chunks.iter().map(Bytes::len).sum());
    for chunk in chunks {
        out.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(out))
}

/// Split a byte buffer into a stream of fixed-size chunks.
pub fn chunked(bytes: Bytes, chunk: usize) -> BodyStream {
    let chunk = chunk.max(1);
    let pieces: Vec<io::Result<Bytes>> = (0..bytes.len())
        .step_by(chunk)
        .map(|start| Ok(bytes.slice(start..(start + chunk).min(bytes.len()))))
        .collect();
    stream::iter(pieces).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_body_collects_in_order() {
        let body = CanonicalBody::Stream(chunked(Bytes::from_static(b"hello world"), 3));
        assert_eq!(body.into_bytes().await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn request_without_body_reads_empty() {
        let mut req = CanonicalRequest::new(Method::GET, Url::parse("http://localhost/").unwrap());
        assert_eq!(req.text().await.unwrap(), "");
    }

    #[tokio::test]
    async fn json_response_sets_content_type() {
        let res = CanonicalResponse::json(StatusCode::CREATED, &serde_json::json!({"ok": true}));
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.content_type(), Some("application/json"));
        assert_eq!(res.into_bytes().await.unwrap(), Bytes::from_static(b"{\"ok\":true}"));
    }
}

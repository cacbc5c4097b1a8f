//! Request body ingestion pipeline.
//!
//! # Data Flow
//! ```text
//! streaming request body
//!     → kind.rs (classify once: method + content type)
//!     → multipart          → spool.rs (temp file, SpoolGuard)
//!     → xml / binary       → raw.rs (capture under the large ceiling, XML check)
//!     → json / form        → raw.rs (capture under the structured ceiling) → decode
//!     → anything else      → raw.rs (capture under the large ceiling)
//!     → collection-create  → raw.rs (drain, payload discarded)
//!     → IngestedBody → http bridge
//! ```
//!
//! # Design Decisions
//! - Never buffer an unbounded amount of request data in memory
//! - Oversized bodies fail with 413 before dispatch; nothing partial is kept
//! - The XML check warns but never rejects

pub mod kind;
pub mod raw;
pub mod spool;

use std::path::PathBuf;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::config::IngestConfig;
use crate::observability::metrics;

pub use kind::BodyKind;
pub use spool::{SpoolGuard, SpooledUpload};

/// Errors raised while reading a request body. All are terminal for the
/// request and surface as client-facing responses.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("malformed JSON body: {0}")]
    MalformedJson(#[source] serde_json::Error),

    #[error("request body stream failed: {0}")]
    Stream(String),

    #[error("failed to spool upload: {0}")]
    Spool(#[source] std::io::Error),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::MalformedJson(_) | IngestError::Stream(_) => StatusCode::BAD_REQUEST,
            IngestError::Spool(e) if e.kind() == std::io::ErrorKind::ConnectionAborted => {
                StatusCode::BAD_REQUEST
            }
            IngestError::Spool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            IngestError::PayloadTooLarge { limit } => {
                format!("Request body too large (limit is {} bytes)", limit)
            }
            IngestError::MalformedJson(_) => "Request body is not valid JSON".to_string(),
            IngestError::Stream(_) => "Request body could not be read".to_string(),
            IngestError::Spool(_) if self.status().is_client_error() => {
                "Upload was interrupted".to_string()
            }
            IngestError::Spool(_) => "Upload could not be stored".to_string(),
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            IngestError::PayloadTooLarge { .. } => "too_large",
            IngestError::MalformedJson(_) => "malformed_json",
            IngestError::Stream(_) => "stream",
            IngestError::Spool(_) => "spool",
        }
    }
}

/// A request body after ingestion, ready to become a canonical body.
#[derive(Debug)]
pub enum IngestedBody {
    /// The method carries no body.
    None,
    /// Collection-create; the original payload was discarded.
    CreateCollection,
    Json(serde_json::Value),
    /// XML or binary, untouched.
    Raw(Bytes),
    Form(Vec<(String, String)>),
    Spooled(SpooledUpload),
    /// Multipart captured in memory because spooling is disabled.
    LegacyRaw(Bytes),
    Opaque(Bytes),
}

/// Turns streaming bodies into `IngestedBody` values under the configured
/// ceilings.
#[derive(Debug, Clone)]
pub struct Ingestor {
    config: IngestConfig,
    spool_dir: PathBuf,
    dav_prefix: String,
}

impl Ingestor {
    pub fn new(config: IngestConfig, spool_dir: PathBuf, dav_prefix: String) -> Self {
        Self {
            config,
            spool_dir,
            dav_prefix,
        }
    }

    pub async fn ingest(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<IngestedBody, IngestError> {
        let result = self.ingest_kind(BodyKind::classify(method, headers), path, headers, body).await;
        if let Err(e) = &result {
            metrics::record_ingest_rejection(e.reason());
            tracing::warn!(method = %method, path = %path, error = %e, "Request body rejected");
        }
        result
    }

    async fn ingest_kind(
        &self,
        kind: BodyKind,
        path: &str,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<IngestedBody, IngestError> {
        let declared = content_length(headers);
        let structured = self.config.max_structured_body_bytes;

        match kind {
            BodyKind::None => Ok(IngestedBody::None),
            BodyKind::CreateCollection => {
                let seen = raw::drain(body, self.config.max_structured_body_bytes).await;
                if seen as usize > self.config.mkcol_warn_bytes {
                    tracing::warn!(
                        path = %path,
                        bytes = seen,
                        "Collection-create request carried an unexpected payload; ignoring it"
                    );
                }
                Ok(IngestedBody::CreateCollection)
            }
            BodyKind::Multipart if self.config.spool_multipart => {
                let upload = spool::spool_body(body, &self.spool_dir)
                    .await
                    .map_err(IngestError::Spool)?;
                Ok(IngestedBody::Spooled(upload))
            }
            BodyKind::Multipart => {
                let bytes = raw::capture(body, self.config.max_raw_body_bytes, declared).await?;
                Ok(IngestedBody::LegacyRaw(bytes))
            }
            BodyKind::XmlOrBinary => {
                let bytes = raw::capture(body, self.config.max_raw_body_bytes, declared).await?;
                if BodyKind::is_xml_content(headers)
                    && self.in_namespace(path)
                    && !bytes.is_empty()
                    && !raw::looks_like_xml(&bytes)
                {
                    tracing::warn!(
                        path = %path,
                        bytes = bytes.len(),
                        "Body declared as XML does not start with a tag"
                    );
                }
                Ok(IngestedBody::Raw(bytes))
            }
            BodyKind::Json => {
                let bytes = raw::capture(body, structured, declared).await?;
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(IngestedBody::Opaque(Bytes::new()));
                }
                let value = serde_json::from_slice(&bytes).map_err(IngestError::MalformedJson)?;
                Ok(IngestedBody::Json(value))
            }
            BodyKind::Form => {
                let bytes = raw::capture(body, structured, declared).await?;
                let pairs = url::form_urlencoded::parse(&bytes).into_owned().collect();
                Ok(IngestedBody::Form(pairs))
            }
            BodyKind::Opaque => {
                let bytes = raw::capture(body, self.config.max_raw_body_bytes, declared).await?;
                Ok(IngestedBody::Opaque(bytes))
            }
        }
    }

    fn in_namespace(&self, path: &str) -> bool {
        crate::dav::in_namespace(&self.dav_prefix, path)
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ingestor(dir: &std::path::Path) -> Ingestor {
        let config = IngestConfig {
            max_raw_body_bytes: 64,
            max_structured_body_bytes: 32,
            ..IngestConfig::default()
        };
        Ingestor::new(config, dir.to_path_buf(), "/dav".into())
    }

    fn headers(ct: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        h
    }

    #[tokio::test]
    async fn mkcol_discards_payload() {
        let dir = tempfile::tempdir().unwrap();
        let mkcol = Method::from_bytes(b"MKCOL").unwrap();
        let body = ingestor(dir.path())
            .ingest(&mkcol, "/dav/new-folder", &HeaderMap::new(), Body::from(vec![b'x'; 2000]))
            .await
            .unwrap();
        assert!(matches!(body, IngestedBody::CreateCollection));
    }

    #[tokio::test]
    async fn oversized_xml_is_413() {
        let dir = tempfile::tempdir().unwrap();
        let err = ingestor(dir.path())
            .ingest(&Method::PUT, "/dav/a.xml", &headers("application/xml"), Body::from(vec![b'<'; 65]))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let err = ingestor(dir.path())
            .ingest(&Method::POST, "/api/paste", &headers("application/json"), Body::from("{oops"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(!err.public_message().contains("oops"));
    }

    #[tokio::test]
    async fn form_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let body = ingestor(dir.path())
            .ingest(
                &Method::POST,
                "/api/login",
                &headers("application/x-www-form-urlencoded"),
                Body::from("user=a+b&pw=%26"),
            )
            .await
            .unwrap();
        match body {
            IngestedBody::Form(pairs) => {
                let expected = vec![
                    ("user".to_string(), "a b".to_string()),
                    ("pw".to_string(), "&".to_string()),
                ];
                assert_eq!(pairs, expected);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn multipart_is_spooled_not_limited() {
        let dir = tempfile::tempdir().unwrap();
        let body = ingestor(dir.path())
            .ingest(
                &Method::POST,
                "/api/upload",
                &headers("multipart/form-data; boundary=x"),
                Body::from(vec![b'm'; 4096]),
            )
            .await
            .unwrap();
        match body {
            IngestedBody::Spooled(upload) => {
                assert_eq!(upload.bytes, 4096);
                let path = upload.path().unwrap().to_path_buf();
                assert!(path.starts_with(dir.path()));
                drop(upload);
                assert!(!path.exists());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_ignores_body() {
        let dir = tempfile::tempdir().unwrap();
        let body = ingestor(dir.path())
            .ingest(&Method::GET, "/", &headers("application/json"), Body::from("{}"))
            .await
            .unwrap();
        assert!(matches!(body, IngestedBody::None));
    }
}

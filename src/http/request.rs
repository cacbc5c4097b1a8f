//! Canonical request construction.
//!
//! # Responsibilities
//! - Determine the externally visible scheme (proxy header, then transport)
//! - Rebuild the absolute URL from `Host` and the request target
//! - Materialize the ingested body into a `CanonicalBody`
//!
//! # Design Decisions
//! - Method and headers pass through verbatim
//! - Body precedence is encoded by `IngestedBody` itself: a spool exists, or
//!   the legacy in-memory capture, or the collection-create override, or the
//!   content-type directed value. Only one can be present.
//! - A body is attached only when the method allows one; `duplex` follows it

use std::io;

use axum::http::{header, request::Parts, uri::Authority, HeaderMap, Method};
use url::Url;

use crate::dav::method_allows_body;
use crate::http::canonical::{CanonicalBody, CanonicalRequest};
use crate::ingest::{IngestedBody, SpoolGuard};
use crate::net::Transport;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// The scheme clients used to reach us.
///
/// The first entry of `X-Forwarded-Proto` wins; proxies chain values
/// left-to-right starting at the client.
pub fn external_scheme(headers: &HeaderMap, transport: Transport) -> String {
    headers
        .get(X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'))
        .unwrap_or_else(|| transport.scheme().to_string())
}

/// Absolute URL as seen by the client.
///
/// `Host` is used only when it parses as a bare authority without userinfo,
/// so the URL path is always the request target's path.
pub fn reconstruct_url(parts: &Parts, scheme: &str) -> Result<Url, url::ParseError> {
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| match raw.parse::<Authority>() {
            Ok(authority) if !authority.as_str().contains('@') => Some(authority),
            _ => {
                tracing::warn!(host = %raw, "Ignoring malformed Host header");
                None
            }
        })
        .or_else(|| parts.uri.authority().cloned())
        .map(|a| a.to_string())
        .unwrap_or_else(|| "localhost".to_string());
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Url::parse(&format!("{}://{}{}", scheme, host, target))
}

/// Build the request handed to the application.
///
/// The returned guard, if any, owns the spooled temp file and must outlive
/// the response.
pub async fn build_canonical(
    parts: &Parts,
    transport: Transport,
    ingested: IngestedBody,
) -> io::Result<(CanonicalRequest, Option<SpoolGuard>)> {
    let scheme = external_scheme(&parts.headers, transport);
    let url = reconstruct_url(parts, &scheme)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut request = CanonicalRequest::new(parts.method.clone(), url);
    request.headers = parts.headers.clone();

    let (body, guard) = materialize(&parts.method, ingested).await?;
    request.duplex = body.is_some();
    request.body = body;
    Ok((request, guard))
}

async fn materialize(
    method: &Method,
    ingested: IngestedBody,
) -> io::Result<(Option<CanonicalBody>, Option<SpoolGuard>)> {
    if !method_allows_body(method) {
        return Ok((None, None));
    }

    let body = match ingested {
        IngestedBody::Spooled(upload) => {
            let (stream, guard) = upload.open().await?;
            return Ok((Some(CanonicalBody::Stream(stream)), Some(guard)));
        }
        IngestedBody::LegacyRaw(bytes) | IngestedBody::Raw(bytes) => CanonicalBody::Bytes(bytes),
        IngestedBody::CreateCollection => CanonicalBody::Text(String::new()),
        IngestedBody::Json(value) => CanonicalBody::Text(
            serde_json::to_string(&value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
        ),
        IngestedBody::Form(pairs) => {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            CanonicalBody::Text(encoded)
        }
        IngestedBody::Opaque(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => CanonicalBody::Text(text),
            Err(_) => CanonicalBody::Bytes(bytes),
        },
        IngestedBody::None => CanonicalBody::Text(String::new()),
    };
    Ok((Some(body), None))
}

//! Content-type classification, done once per request.

use axum::http::{header, HeaderMap, Method};

use crate::dav::methods::{is_create_collection, method_allows_body};

/// How a request body is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// The method carries no body; anything sent is ignored.
    None,
    /// Collection-create: the payload is drained and replaced by "".
    CreateCollection,
    Json,
    /// XML or opaque binary, captured raw under the large ceiling.
    XmlOrBinary,
    Form,
    /// Streamed to a temp file.
    Multipart,
    Opaque,
}

impl BodyKind {
    pub fn classify(method: &Method, headers: &HeaderMap) -> Self {
        if !method_allows_body(method) {
            return BodyKind::None;
        }
        if is_create_collection(method) {
            return BodyKind::CreateCollection;
        }

        let essence = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();

        match essence.as_str() {
            "application/xml" | "text/xml" | "application/octet-stream" => BodyKind::XmlOrBinary,
            "application/x-www-form-urlencoded" => BodyKind::Form,
            "application/json" => BodyKind::Json,
            e if e.ends_with("+json") => BodyKind::Json,
            e if e.starts_with("multipart/") => BodyKind::Multipart,
            _ => BodyKind::Opaque,
        }
    }

    pub fn is_xml_content(headers: &HeaderMap) -> bool {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .is_some_and(|e| e == "application/xml" || e == "text/xml")
    }
}

/// Lower-cased media type without parameters.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(ct: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        h
    }

    #[test]
    fn classifies_content_types() {
        let post = Method::POST;
        assert_eq!(BodyKind::classify(&post, &headers("application/json; charset=utf-8")), BodyKind::Json);
        assert_eq!(BodyKind::classify(&post, &headers("application/merge-patch+json")), BodyKind::Json);
        assert_eq!(BodyKind::classify(&post, &headers("Text/XML")), BodyKind::XmlOrBinary);
        assert_eq!(BodyKind::classify(&post, &headers("application/octet-stream")), BodyKind::XmlOrBinary);
        assert_eq!(
            BodyKind::classify(&post, &headers("multipart/form-data; boundary=x")),
            BodyKind::Multipart
        );
        assert_eq!(BodyKind::classify(&post, &headers("application/x-www-form-urlencoded")), BodyKind::Form);
        assert_eq!(BodyKind::classify(&post, &headers("text/plain")), BodyKind::Opaque);
        assert_eq!(BodyKind::classify(&post, &HeaderMap::new()), BodyKind::Opaque);
    }

    #[test]
    fn method_overrides_content_type() {
        let mkcol = Method::from_bytes(b"MKCOL").unwrap();
        assert_eq!(BodyKind::classify(&mkcol, &headers("multipart/form-data")), BodyKind::CreateCollection);
        assert_eq!(BodyKind::classify(&Method::GET, &headers("application/json")), BodyKind::None);
        assert_eq!(BodyKind::classify(&Method::HEAD, &HeaderMap::new()), BodyKind::None);
    }

    #[test]
    fn dav_verbs_carry_bodies() {
        let propfind = Method::from_bytes(b"PROPFIND").unwrap();
        assert_eq!(BodyKind::classify(&propfind, &headers("application/xml")), BodyKind::XmlOrBinary);
    }
}

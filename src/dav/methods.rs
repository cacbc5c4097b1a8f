//! WebDAV verb set and per-verb body rules.

use axum::http::{HeaderValue, Method};

/// Collection-create verb.
pub const MKCOL: &str = "MKCOL";

/// Whether a request with this method may carry a body.
///
/// Everything except the safe retrieval verbs does: POST, PUT, PATCH,
/// DELETE and every WebDAV extension verb.
pub fn method_allows_body(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::CONNECT
    )
}

pub fn is_create_collection(method: &Method) -> bool {
    method.as_str().eq_ignore_ascii_case(MKCOL)
}

fn is_standard(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET
            | Method::HEAD
            | Method::POST
            | Method::PUT
            | Method::PATCH
            | Method::DELETE
            | Method::OPTIONS
            | Method::TRACE
            | Method::CONNECT
    )
}

/// The configured, advertised verb set.
#[derive(Debug, Clone)]
pub struct DavMethods {
    methods: Vec<Method>,
    advertised: HeaderValue,
}

impl DavMethods {
    /// Build from configured names. Invalid names are skipped with a warning;
    /// duplicates are collapsed and order is preserved.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut methods: Vec<Method> = Vec::new();
        for name in names {
            let name = name.as_ref().trim().to_ascii_uppercase();
            match Method::from_bytes(name.as_bytes()) {
                Ok(m) if !methods.contains(&m) => methods.push(m),
                Ok(_) => {}
                Err(_) => tracing::warn!(method = %name, "Ignoring invalid WebDAV method"),
            }
        }

        let joined = methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
        let advertised = HeaderValue::from_str(&joined).unwrap_or_else(|_| HeaderValue::from_static(""));
        Self { methods, advertised }
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Non-standard verbs that need explicit registration.
    pub fn extension_methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter().filter(|m| !is_standard(m))
    }

    /// `Allow` / `Access-Control-Allow-Methods` value.
    pub fn advertised(&self) -> &HeaderValue {
        &self.advertised
    }

    /// True when the method is neither standard nor configured.
    pub fn is_unregistered_extension(&self, method: &Method) -> bool {
        !is_standard(method) && !self.contains(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter()
    }
}

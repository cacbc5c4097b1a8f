//! Namespace middleware: preflight answering and verb advertisement.
//!
//! # Responsibilities
//! - Answer `OPTIONS` under the namespace without reaching the application
//! - Stamp `Allow` / `Access-Control-Allow-Methods` on every namespace response
//! - Refuse extension verbs that were never registered
//!
//! Requests outside the namespace pass through untouched.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::DavConfig;
use crate::dav::methods::DavMethods;
use crate::dav::in_namespace;

/// Compiled protocol surface, shared by the middleware.
#[derive(Debug, Clone)]
pub struct DavSurface {
    prefix: String,
    methods: DavMethods,
    origin: HeaderValue,
    preflight_headers: HeaderMap,
}

impl DavSurface {
    pub fn from_config(config: &DavConfig) -> Self {
        let origin = HeaderValue::from_str(&config.cors_origin).unwrap_or_else(|_| {
            tracing::warn!(origin = %config.cors_origin, "Invalid DAV CORS origin, using *");
            HeaderValue::from_static("*")
        });

        let mut preflight_headers = HeaderMap::new();
        for (name, value) in &config.response_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    preflight_headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Skipping invalid DAV response header"),
            }
        }

        Self {
            prefix: config.prefix.clone(),
            methods: DavMethods::new(&config.methods),
            origin,
            preflight_headers,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn methods(&self) -> &DavMethods {
        &self.methods
    }

    pub fn matches(&self, path: &str) -> bool {
        in_namespace(&self.prefix, path)
    }

    /// The short-circuit reply to `OPTIONS` inside the namespace.
    pub fn preflight(&self) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        for (name, value) in &self.preflight_headers {
            headers.insert(name.clone(), value.clone());
        }
        self.advertise(headers);
        response
    }

    /// Overwrite verb advertisement headers; set the origin unless present.
    fn advertise(&self, headers: &mut HeaderMap) {
        headers.insert(header::ALLOW, self.methods.advertised().clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.methods.advertised().clone(),
        );
        if !headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        }
    }

    fn method_not_allowed(&self, method: &Method) -> Response {
        tracing::debug!(method = %method, "Unregistered WebDAV verb");
        let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
        self.advertise(response.headers_mut());
        response
    }
}

/// Axum middleware applying the protocol surface to namespace requests.
pub async fn dav_surface(
    State(surface): State<Arc<DavSurface>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !surface.matches(req.uri().path()) {
        return next.run(req).await;
    }

    if req.method() == Method::OPTIONS {
        tracing::debug!(path = %req.uri().path(), "Answering WebDAV preflight");
        return surface.preflight();
    }

    if surface.methods().is_unregistered_extension(req.method()) {
        return surface.method_not_allowed(req.method());
    }

    let mut response = next.run(req).await;
    surface.advertise(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::any, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn router(hits: Arc<AtomicUsize>) -> Router {
        let surface = Arc::new(DavSurface::from_config(&DavConfig::default()));
        Router::new()
            .route(
                "/{*path}",
                any(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        StatusCode::MULTI_STATUS
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(surface, dav_surface))
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::from_bytes(method.as_bytes()).unwrap())
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let hits = Arc::new(AtomicUsize::new(0));
        let res = router(hits.clone()).oneshot(request("OPTIONS", "/dav/folder")).await.unwrap();

        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let expected = DavMethods::new(&DavConfig::default().methods);
        assert_eq!(res.headers()[header::ALLOW], *expected.advertised());
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], *expected.advertised());
        assert_eq!(res.headers()["dav"], "1, 2");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn namespace_responses_advertise_verbs() {
        let hits = Arc::new(AtomicUsize::new(0));
        let res = router(hits.clone()).oneshot(request("PROPFIND", "/dav/a.txt")).await.unwrap();

        assert_eq!(res.status(), StatusCode::MULTI_STATUS);
        assert!(res.headers().contains_key(header::ALLOW));
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outside_namespace_untouched() {
        let hits = Arc::new(AtomicUsize::new(0));
        let res = router(hits.clone()).oneshot(request("OPTIONS", "/davx/a")).await.unwrap();

        assert_eq!(res.status(), StatusCode::MULTI_STATUS);
        assert!(!res.headers().contains_key(header::ALLOW));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_extension_verb_refused() {
        let hits = Arc::new(AtomicUsize::new(0));
        let res = router(hits.clone()).oneshot(request("SEARCH", "/dav/a")).await.unwrap();

        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}

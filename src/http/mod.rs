//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, CORS, WebDAV surface)
//!     → ingest (body → IngestedBody)
//!     → request.rs (scheme, URL, CanonicalRequest)
//!     → Application::fetch
//!     → response.rs (content-type directed re-serialization)
//!     → error.rs (sanitized bodies for every failure)
//!     → Send to client
//! ```

pub mod canonical;
pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use canonical::{CanonicalBody, CanonicalRequest, CanonicalResponse};
pub use request::{X_FORWARDED_PROTO, X_REQUEST_ID};
pub use server::HttpServer;

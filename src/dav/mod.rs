//! WebDAV protocol surface.
//!
//! # Data Flow
//! ```text
//! request under the namespace prefix
//!     → surface.rs (OPTIONS → 204 preflight, no dispatch)
//!     → surface.rs (unregistered extension verb → 405)
//!     → bridge handler → application
//!     ← surface.rs stamps Allow / Access-Control-Allow-Methods
//! ```
//!
//! # Design Decisions
//! - The advertised verb set comes from configuration, never from the code
//! - Method-specific body handling lives in `methods.rs` and is shared with
//!   ingestion so both agree on which verbs carry bodies

pub mod methods;
pub mod surface;

pub use methods::{is_create_collection, method_allows_body, DavMethods};
pub use surface::{dav_surface, DavSurface};

/// True for the prefix itself and anything below it (`/dav`, `/dav/x`),
/// but not for siblings such as `/davx`.
pub fn in_namespace(prefix: &str, path: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::in_namespace;

    #[test]
    fn namespace_matching() {
        assert!(in_namespace("/dav", "/dav"));
        assert!(in_namespace("/dav", "/dav/"));
        assert!(in_namespace("/dav", "/dav/a/b.txt"));
        assert!(!in_namespace("/dav", "/davx"));
        assert!(!in_namespace("/dav", "/api/dav"));
    }
}

//! Runtime bridge for a fetch-style paste/file sharing application.
//!
//! Hosts an application written against `fetch(request, env, ctx)` on a
//! native HTTP server: an embedded SQLite database stands in for the managed
//! store, request bodies are ingested under size ceilings, WebDAV verbs get
//! first-class routing, and a supervisor keeps an eye on memory.

// Core subsystems
pub mod app;
pub mod dav;
pub mod http;
pub mod ingest;
pub mod net;
pub mod storage;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod supervisor;

pub use app::{AppError, Application, Env, ExecutionContext};
pub use config::BridgeConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use storage::Database;

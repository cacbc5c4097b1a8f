//! The boundary to the application's business logic.
//!
//! # Data Flow
//! ```text
//! http bridge
//!     → Application::fetch(CanonicalRequest, Env, ExecutionContext)
//!         → Env.db (persistence adapter) for all storage
//!     ← CanonicalResponse | AppError
//! ```
//!
//! The bridge knows nothing about routes, authentication or domain rules;
//! everything behind `fetch` is the application's concern.

pub mod health;

use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::http::canonical::{CanonicalRequest, CanonicalResponse};
use crate::storage::{Database, StorageError};

pub use health::HealthApplication;

/// Single entry point of a fetch-style application.
pub trait Application: Send + Sync + 'static {
    fn fetch(
        &self,
        request: CanonicalRequest,
        env: Env,
        ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<CanonicalResponse, AppError>>;
}

/// Bindings handed to the application on every request.
#[derive(Clone, Debug)]
pub struct Env {
    pub db: Database,
    /// At-rest encryption secret (possibly the placeholder default).
    pub encryption_secret: Arc<str>,
}

/// Per-request execution context.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    request_id: Arc<str>,
}

impl ExecutionContext {
    pub fn new(request_id: impl Into<Arc<str>>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Run `task` in the background, outliving the response.
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let request_id = Arc::clone(&self.request_id);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::warn!(request_id = %request_id, error = %e, "Background task failed");
            }
        });
    }
}

/// Failure raised by the application.
///
/// `status` is honoured by the bridge when present; otherwise the failure
/// becomes a 500.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    pub status: Option<StatusCode>,
    pub message: String,
}

impl AppError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::new(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::new(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::with_status(StatusCode::BAD_REQUEST, e.to_string())
    }
}

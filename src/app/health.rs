//! Minimal application served when the binary runs without an embedder.

use axum::http::{Method, StatusCode};
use futures_util::future::BoxFuture;
use serde_json::json;

use crate::app::{AppError, Application, Env, ExecutionContext};
use crate::http::canonical::{CanonicalRequest, CanonicalResponse};

pub const HEALTH_PATH: &str = "/api/health";

/// Answers `GET /api/health` with a database ping and 404 for everything else.
#[derive(Debug, Default)]
pub struct HealthApplication;

impl Application for HealthApplication {
    fn fetch(
        &self,
        request: CanonicalRequest,
        env: Env,
        ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<CanonicalResponse, AppError>> {
        Box::pin(async move {
            if request.url.path() != HEALTH_PATH {
                return Ok(CanonicalResponse::json(
                    StatusCode::NOT_FOUND,
                    &json!({ "code": 404, "message": "Not Found" }),
                ));
            }
            if request.method != Method::GET && request.method != Method::HEAD {
                return Err(AppError::with_status(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
            }

            let ping = env.db.prepare("SELECT 1 AS ok").first_value("ok").await?;
            Ok(CanonicalResponse::json(
                StatusCode::OK,
                &json!({
                    "status": "ok",
                    "database": ping == Some(json!(1)),
                    "request_id": ctx.request_id(),
                }),
            ))
        })
    }
}

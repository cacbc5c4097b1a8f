//! Outward-facing error bodies and log masking.

use std::sync::LazyLock;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

/// `key=...`, `"password": "..."`, `Authorization: Bearer ...` and friends.
static SENSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b([\w-]*(?:key|password|passwd|token|secret|auth)[\w-]*)("?\s*[=:]\s*"?|"?\s+"?)((?:(?:bearer|basic|digest)\s+)?[^"\s,;&]+)"#,
    )
    .expect("constant pattern")
});

/// Credentials after an auth scheme with no key word in front of them.
static AUTH_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(Bearer|Basic|Digest)(\s+)([^\s,;&\x22]+)").expect("constant pattern")
});

const MASK: &str = "[REDACTED]";

/// Replace values that follow a sensitive-looking word or an auth scheme.
pub fn mask_sensitive(message: &str) -> String {
    let keyed = SENSITIVE.replace_all(message, |caps: &regex::Captures<'_>| {
        format!("{}{}{}", &caps[1], &caps[2], MASK)
    });
    AUTH_SCHEME
        .replace_all(&keyed, |caps: &regex::Captures<'_>| {
            if &caps[3] == MASK {
                caps[0].to_string()
            } else {
                format!("{}{}{}", &caps[1], &caps[2], MASK)
            }
        })
        .into_owned()
}

/// JSON error body sent to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

/// A client-facing 4xx from the ingestion boundary. The message is already
/// safe to show.
pub fn client_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        code: status.as_u16(),
        message: message.into(),
        error_id: None,
    };
    (status, Json(body)).into_response()
}

/// Sanitized dispatch failure. Only the status, a generic message and the
/// correlation id leave the process; the raw message is logged masked.
pub fn dispatch_error(status: StatusCode, raw_message: &str, request_id: &str) -> Response {
    let error_id = Uuid::new_v4().to_string();
    let masked = mask_sensitive(raw_message);

    if status.is_server_error() {
        tracing::error!(
            request_id = %request_id,
            error_id = %error_id,
            status = status.as_u16(),
            error = %masked,
            "Application failed"
        );
    } else {
        tracing::warn!(
            request_id = %request_id,
            error_id = %error_id,
            status = status.as_u16(),
            error = %masked,
            "Application rejected request"
        );
    }

    let body = ErrorBody {
        code: status.as_u16(),
        message: generic_message(status).to_string(),
        error_id: Some(error_id),
    };
    (status, Json(body)).into_response()
}

fn generic_message(status: StatusCode) -> &'static str {
    if status.is_server_error() {
        "Internal Server Error"
    } else {
        status.canonical_reason().unwrap_or("Request failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_sensitive_values() {
        let masked = mask_sensitive("open failed: password=hunter2, api_key: abc123 user=bob");
        assert!(!masked.contains("hunter2"));
        assert!(!masked.contains("abc123"));
        assert!(masked.contains("user=bob"));
        assert!(masked.contains("password=[REDACTED]"));
    }

    #[test]
    fn masks_case_insensitively() {
        let masked = mask_sensitive("SECRET=xyz");
        assert_eq!(masked, "SECRET=[REDACTED]");
    }

    #[test]
    fn masks_auth_scheme_credentials() {
        let masked = mask_sensitive("Authorization Bearer eyJhbGciOiSECRETJWT");
        assert_eq!(masked, "Authorization [REDACTED]");

        let masked = mask_sensitive("authorization: basic dXNlcjpwYXNz, retrying");
        assert!(!masked.contains("dXNlcjpwYXNz"));
        assert!(masked.contains("retrying"));

        let masked = mask_sensitive("upstream rejected Bearer eyJhbGciOiSECRETJWT");
        assert_eq!(masked, "upstream rejected Bearer [REDACTED]");
    }

    #[test]
    fn masks_json_quoted_pairs() {
        let masked = mask_sensitive(r#"bad payload {"token":"abc123","password": "hunter2","user":"bob"}"#);
        assert!(!masked.contains("abc123"));
        assert!(!masked.contains("hunter2"));
        assert!(masked.contains(r#""token":"[REDACTED]""#));
        assert!(masked.contains(r#""user":"bob""#));
    }

    #[test]
    fn leaves_plain_messages_alone() {
        assert_eq!(mask_sensitive("no such table: pastes"), "no such table: pastes");
    }

    #[tokio::test]
    async fn dispatch_error_hides_detail() {
        let res = dispatch_error(StatusCode::INTERNAL_SERVER_ERROR, "token=abc leaked", "req-1");
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(res.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 500);
        assert_eq!(body["message"], "Internal Server Error");
        assert!(body["error_id"].as_str().is_some());
        assert!(!String::from_utf8_lossy(&bytes).contains("abc"));
    }
}

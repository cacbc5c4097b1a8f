//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ceilings > 0, interval > 0, ratio in (0, 1])
//! - Check the protocol namespace and its verb set are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::{HeaderName, HeaderValue, Method};

use crate::config::schema::BridgeConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::new("listener.tls", "cert_path and key_path are both required"));
        }
    }

    if config.storage.database_file.is_empty() {
        errors.push(ValidationError::new("storage.database_file", "must not be empty"));
    }

    if config.ingest.max_raw_body_bytes == 0 {
        errors.push(ValidationError::new("ingest.max_raw_body_bytes", "must be greater than zero"));
    }
    if config.ingest.max_structured_body_bytes == 0 {
        errors.push(ValidationError::new("ingest.max_structured_body_bytes", "must be greater than zero"));
    }

    let prefix = &config.dav.prefix;
    if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
        errors.push(ValidationError::new(
            "dav.prefix",
            format!("{:?} must start with '/' and not end with one", prefix),
        ));
    }
    if config.dav.methods.is_empty() {
        errors.push(ValidationError::new("dav.methods", "at least one verb is required"));
    }
    for method in &config.dav.methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new("dav.methods", format!("{:?} is not a valid HTTP method", method)));
        }
    }
    if HeaderValue::from_str(&config.dav.cors_origin).is_err() {
        errors.push(ValidationError::new("dav.cors_origin", "not a valid header value"));
    }
    for (name, value) in &config.dav.response_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new("dav.response_headers", format!("invalid header {:?}", name)));
        }
    }

    if config.supervisor.interval_minutes == 0 {
        errors.push(ValidationError::new("supervisor.interval_minutes", "must be greater than zero"));
    }
    let ratio = config.supervisor.usage_ratio_threshold;
    if !(ratio > 0.0 && ratio <= 1.0) {
        errors.push(ValidationError::new("supervisor.usage_ratio_threshold", "must be in (0, 1]"));
    }

    if config.secrets.require_encryption_secret && config.secrets.uses_placeholder() {
        errors.push(ValidationError::new(
            "secrets.encryption_secret",
            "required but not set (ENCRYPTION_SECRET)",
        ));
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("{:?} is not one of pretty, json", other),
        )),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

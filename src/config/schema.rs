//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder used when no encryption secret is configured.
pub const DEFAULT_ENCRYPTION_SECRET: &str = "default-encryption-key";

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Embedded database and scratch directories.
    pub storage: StorageConfig,

    /// Request body ingestion limits.
    pub ingest: IngestConfig,

    /// WebDAV protocol surface.
    pub dav: DavConfig,

    /// CORS policy for routes outside the protocol namespace.
    pub cors: CorsConfig,

    /// Memory supervisor settings.
    pub supervisor: SupervisorConfig,

    /// Secrets handed to the application.
    pub secrets: SecretsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl ListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Storage layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the database file.
    pub data_dir: PathBuf,

    /// Database file name inside `data_dir`.
    pub database_file: String,

    /// Optional SQL script applied once per process before the first request.
    pub schema_file: Option<PathBuf>,

    /// Directory for spooled uploads. Defaults to the OS temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database_file: "paste.db".to_string(),
            schema_file: None,
            temp_dir: None,
        }
    }
}

/// Body ingestion limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Ceiling for raw XML / binary / unrecognized bodies captured in memory.
    pub max_raw_body_bytes: usize,

    /// Ceiling for JSON and form bodies decoded in memory.
    pub max_structured_body_bytes: usize,

    /// Spool multipart bodies to disk. When off, they are captured in
    /// memory under `max_raw_body_bytes`.
    pub spool_multipart: bool,

    /// Collection-create payloads above this size are logged as anomalous.
    pub mkcol_warn_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_raw_body_bytes: 1024 * 1024 * 1024, // 1GiB
            max_structured_body_bytes: 10 * 1024 * 1024,
            spool_multipart: true,
            mkcol_warn_bytes: 1024,
        }
    }
}

/// WebDAV protocol surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DavConfig {
    /// Path prefix of the protocol namespace.
    pub prefix: String,

    /// Verbs advertised and accepted under the namespace.
    pub methods: Vec<String>,

    /// Value of `Access-Control-Allow-Origin` on namespace responses.
    pub cors_origin: String,

    /// Extra headers sent on preflight responses (e.g. `DAV`, `MS-Author-Via`).
    pub response_headers: BTreeMap<String, String>,
}

impl Default for DavConfig {
    fn default() -> Self {
        let methods = [
            "GET", "HEAD", "PUT", "POST", "DELETE", "OPTIONS", "PROPFIND", "PROPPATCH",
            "MKCOL", "COPY", "MOVE", "LOCK", "UNLOCK",
        ];
        let response_headers = [
            ("DAV", "1, 2"),
            ("MS-Author-Via", "DAV"),
            (
                "Access-Control-Allow-Headers",
                "Authorization, Content-Type, Depth, Destination, Overwrite, If, Lock-Token, Timeout",
            ),
            ("Access-Control-Expose-Headers", "DAV, Lock-Token, ETag, Content-Length"),
            ("Access-Control-Max-Age", "86400"),
        ];
        Self {
            prefix: "/dav".to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            cors_origin: "*".to_string(),
            response_headers: response_headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// CORS configuration for the API surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,

    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,

    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            max_age_secs: 86400,
        }
    }
}

/// Memory supervisor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub enabled: bool,

    /// Sampling interval in minutes.
    pub interval_minutes: u64,

    /// Usage ratio above which reclamation is attempted.
    pub usage_ratio_threshold: f64,

    /// Buffered body bytes above which reclamation is attempted.
    pub external_threshold_bytes: u64,

    /// Root of the cgroup filesystem.
    pub cgroup_root: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 20,
            usage_ratio_threshold: 0.85,
            external_threshold_bytes: 50 * 1024 * 1024,
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
        }
    }
}

/// Secrets passed to the application in its environment bundle.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecretsConfig {
    /// At-rest encryption secret.
    pub encryption_secret: Option<String>,

    /// Refuse to start when `encryption_secret` is unset.
    pub require_encryption_secret: bool,
}

impl SecretsConfig {
    /// The configured secret, or the placeholder.
    pub fn effective_secret(&self) -> &str {
        self.encryption_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ENCRYPTION_SECRET)
    }

    pub fn uses_placeholder(&self) -> bool {
        self.effective_secret() == DEFAULT_ENCRYPTION_SECRET
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

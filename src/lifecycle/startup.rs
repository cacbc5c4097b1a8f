//! Startup orchestration.
//!
//! # Responsibilities
//! - Prepare the data and spool directories
//! - Open the database and assemble the application environment
//! - Build the HTTP server and the memory supervisor
//! - Bind the listener (plain or TLS) and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Schema setup is deferred to the first request, not done here
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::app::{Application, Env};
use crate::config::BridgeConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::tls::load_tls_config;
use crate::storage::{Database, LazySchema, NoSchema, SchemaInitializer, SqlScriptSchema, StorageError};
use crate::supervisor::{self, MemoryMonitor, Reclaimer, SqliteReclaimer};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to prepare directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid listen address {0}")]
    Address(String),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to start serving.
pub struct Bootstrap {
    pub server: HttpServer,
    pub db: Database,
    pub monitor: Option<MemoryMonitor>,
}

/// Open storage and assemble the server around `app`.
pub fn build(config: &BridgeConfig, app: Arc<dyn Application>) -> Result<Bootstrap, StartupError> {
    ensure_dir(&config.storage.data_dir)?;
    ensure_dir(&config.storage.spool_dir())?;

    let db_path = config.storage.database_path();
    let db = Database::open(&db_path)?;
    tracing::info!(path = %db_path.display(), "Database opened");

    if config.secrets.uses_placeholder() {
        tracing::warn!(
            "ENCRYPTION_SECRET is not set; using the built-in placeholder. \
             Data encrypted with it is not protected. Set secrets.require_encryption_secret to refuse this."
        );
    }
    let env = Env {
        db: db.clone(),
        encryption_secret: Arc::from(config.secrets.effective_secret()),
    };

    let schema = LazySchema::new(db.clone(), schema_initializer(config));
    let server = HttpServer::new(config, app, env, schema);

    let monitor = config.supervisor.enabled.then(|| {
        let reclaimer: Arc<dyn Reclaimer> = Arc::new(SqliteReclaimer::new(db.clone()));
        MemoryMonitor::new(
            config.supervisor.clone(),
            supervisor::detect(&config.supervisor.cgroup_root),
            Some(reclaimer),
        )
    });

    Ok(Bootstrap { server, db, monitor })
}

/// Start background tasks, bind the listener and serve until shutdown.
pub async fn serve(config: &BridgeConfig, bootstrap: Bootstrap, shutdown: Shutdown) -> Result<(), StartupError> {
    let Bootstrap { server, monitor, .. } = bootstrap;

    if let Some(monitor) = monitor {
        tokio::spawn(monitor.run(shutdown.subscribe()));
    }

    let bind = config.listener.bind_address();
    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = bind.parse().map_err(|_| StartupError::Address(bind.clone()))?;
            let rustls = load_tls_config(tls).await?;
            server.run_tls(addr, rustls, shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(&bind).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener, shutdown).await?;
        }
    }
    Ok(())
}

fn schema_initializer(config: &BridgeConfig) -> Arc<dyn SchemaInitializer> {
    match &config.storage.schema_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "Schema script configured");
            Arc::new(SqlScriptSchema::File(path.clone()))
        }
        None => Arc::new(NoSchema),
    }
}

fn ensure_dir(path: &Path) -> Result<(), StartupError> {
    std::fs::create_dir_all(path).map_err(|source| StartupError::Directory {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::HealthApplication;

    #[tokio::test]
    async fn build_creates_directories_and_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig::default();
        config.storage.data_dir = dir.path().join("data");
        config.storage.temp_dir = Some(dir.path().join("spool"));
        config.supervisor.cgroup_root = dir.path().join("no-cgroup");

        let boot = build(&config, Arc::new(HealthApplication)).unwrap();
        assert!(dir.path().join("data/paste.db").exists());
        assert!(dir.path().join("spool").is_dir());
        assert!(boot.monitor.is_some());

        let one = boot.db.prepare("SELECT 1 AS one").first_value("one").await.unwrap();
        assert_eq!(one, Some(serde_json::json!(1)));
    }

    #[test]
    fn unwritable_data_dir_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = BridgeConfig::default();
        config.storage.data_dir = file.path().join("data");
        assert!(matches!(
            build(&config, Arc::new(HealthApplication)),
            Err(StartupError::Directory { .. })
        ));
    }
}

//! paste-bridge
//!
//! Serves a fetch-style application over HTTP/1.1 and HTTP/2.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net (TCP / TLS)
//!                      → http server (request ID, trace, CORS)
//!                      → dav surface (preflight, Allow)
//!                      → ingest (spool / capture / decode)
//!                      → canonical request
//!                      → Application::fetch(request, Env { db, secret }, ctx)
//!                      → response translation
//!     ◀────────────── Client Response
//!
//!     Background: supervisor (memory sampling, advisory reclaim)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use paste_bridge::app::HealthApplication;
use paste_bridge::config::{self, BridgeConfig};
use paste_bridge::lifecycle::{self, signals, Shutdown};
use paste_bridge::observability::{logging, metrics};
use paste_bridge::storage::{Database, LazySchema, SqlScriptSchema};

#[derive(Parser, Debug)]
#[command(name = "paste-bridge", version, about = "Fetch-style application bridge")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "PASTE_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve traffic (default)
    Serve,
    /// Print the effective configuration after environment overrides
    CheckConfig,
    /// Apply the configured schema script and exit
    InitSchema,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::CheckConfig => check_config(config),
        Command::InitSchema => init_schema(config).await,
    }
}

async fn serve(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "paste-bridge starting");
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        data_dir = %config.storage.data_dir.display(),
        dav_prefix = %config.dav.prefix,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::install(shutdown.clone());

    let bootstrap = lifecycle::build(&config, Arc::new(HealthApplication))?;
    lifecycle::serve(&config, bootstrap, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn check_config(mut config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.secrets.encryption_secret.is_some() {
        config.secrets.encryption_secret = Some("[REDACTED]".to_string());
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn init_schema(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&config.observability);
    let Some(schema_file) = config.storage.schema_file.clone() else {
        return Err("storage.schema_file is not configured".into());
    };

    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db = Database::open(&config.storage.database_path())?;
    LazySchema::new(db, Arc::new(SqlScriptSchema::File(schema_file)))
        .ensure()
        .await?;
    tracing::info!("Schema applied");
    Ok(())
}

//! HTTP server setup and the bridge handler.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all bridge handler
//! - Wire up middleware (tracing, request ID, CORS, WebDAV surface)
//! - Serve plain TCP or TLS with graceful shutdown
//! - Per request: lazy schema init → ingest → canonical request → fetch →
//!   response translation, with every failure converted to a response

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode},
    middleware,
    response::Response,
    routing::any,
    Extension, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use futures_util::FutureExt;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::app::{Application, Env, ExecutionContext};
use crate::config::schema::CorsConfig;
use crate::config::BridgeConfig;
use crate::dav::{dav_surface, DavSurface};
use crate::http::{error, request, response, X_REQUEST_ID};
use crate::ingest::Ingestor;
use crate::lifecycle::Shutdown;
use crate::net::Transport;
use crate::observability::metrics;
use crate::storage::LazySchema;

/// How long in-flight TLS connections get to finish after shutdown.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<dyn Application>,
    pub env: Env,
    pub schema: LazySchema,
    pub ingestor: Arc<Ingestor>,
}

/// HTTP server for the bridge.
pub struct HttpServer {
    router: Router,
    transport: Transport,
}

impl HttpServer {
    /// Create a new HTTP server around `app`.
    pub fn new(config: &BridgeConfig, app: Arc<dyn Application>, env: Env, schema: LazySchema) -> Self {
        let ingestor = Ingestor::new(
            config.ingest.clone(),
            config.storage.spool_dir(),
            config.dav.prefix.clone(),
        );
        let state = AppState {
            app,
            env,
            schema,
            ingestor: Arc::new(ingestor),
        };
        let transport = if config.listener.tls.is_some() {
            Transport::Tls
        } else {
            Transport::Plain
        };

        let router = Self::build_router(config, state, transport);
        Self { router, transport }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &BridgeConfig, state: AppState, transport: Transport) -> Router {
        let surface = Arc::new(DavSurface::from_config(&config.dav));

        let mut router = Router::new()
            .route("/{*path}", any(bridge_handler))
            .route("/", any(bridge_handler))
            .with_state(state);
        if let Some(cors) = cors_layer(&config.cors) {
            router = router.layer(cors);
        }

        router
            .layer(middleware::from_fn_with_state(surface, dav_surface))
            .layer(Extension(transport))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The fully layered router, for serving through another stack.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on a plain TCP listener until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server with in-process TLS termination.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        let mut rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = rx.recv().await;
            tracing::info!("HTTPS server draining");
            drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls).handle(handle).serve(app).await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if !config.enabled {
        return None;
    }
    let origin = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(origins)
    };
    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(config.max_age_secs)),
    )
}

/// Main bridge handler.
/// Ingests the body, calls the application and translates its answer.
async fn bridge_handler(
    State(state): State<AppState>,
    Extension(transport): Extension<Transport>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        peer = ?request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0),
        "Bridging request"
    );

    let response = handle(&state, transport, &request_id, request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

async fn handle(state: &AppState, transport: Transport, request_id: &str, request: Request<Body>) -> Response {
    if let Err(e) = state.schema.ensure().await {
        tracing::error!(request_id = %request_id, error = %e, "Database initialization failed; will retry");
    }

    let (parts, body) = request.into_parts();
    let ingested = match state
        .ingestor
        .ingest(&parts.method, parts.uri.path(), &parts.headers, body)
        .await
    {
        Ok(body) => body,
        Err(e) => return error::client_error(e.status(), e.public_message()),
    };

    let (canonical, guard) = match request::build_canonical(&parts, transport, ingested).await {
        Ok(built) => built,
        Err(e) => {
            metrics::record_dispatch_error(500);
            return error::dispatch_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), request_id);
        }
    };

    let ctx = ExecutionContext::new(request_id);
    let outcome = AssertUnwindSafe(state.app.fetch(canonical, state.env.clone(), ctx))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(res)) => response::translate(res, guard).await,
        Ok(Err(e)) => {
            let status = e.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            metrics::record_dispatch_error(status.as_u16());
            error::dispatch_error(status, &e.message, request_id)
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "application panicked".to_string());
            metrics::record_dispatch_error(500);
            error::dispatch_error(StatusCode::INTERNAL_SERVER_ERROR, &message, request_id)
        }
    }
}

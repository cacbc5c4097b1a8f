//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use futures_util::future::BoxFuture;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;

use paste_bridge::http::CanonicalResponse;
use paste_bridge::lifecycle::{self, Shutdown};
use paste_bridge::storage::BatchItem;
use paste_bridge::{AppError, Application, BridgeConfig, Database, Env, ExecutionContext};

/// What the application saw for one request.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Seen {
    pub method: String,
    pub url: String,
    pub had_body: bool,
    pub body: Vec<u8>,
    pub duplex: bool,
    pub content_type: Option<String>,
}

/// Scripted application. Records every request and answers by path.
#[derive(Default)]
pub struct Recorder {
    pub seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    #[allow(dead_code)]
    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl Application for Recorder {
    fn fetch(
        &self,
        mut request: paste_bridge::http::CanonicalRequest,
        env: Env,
        _ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<CanonicalResponse, AppError>> {
        Box::pin(async move {
            let had_body = request.body.is_some();
            let content_type = request.header(header::CONTENT_TYPE).map(str::to_string);
            let body = request.bytes().await?;
            self.seen.lock().unwrap().push(Seen {
                method: request.method.to_string(),
                url: request.url.to_string(),
                had_body,
                body: body.to_vec(),
                duplex: request.duplex,
                content_type: content_type.clone(),
            });

            match request.url.path() {
                "/echo" => {
                    let mut res = CanonicalResponse::new(StatusCode::OK).with_body(body);
                    if let Some(ct) = content_type {
                        res = res.with_header(header::CONTENT_TYPE, HeaderValue::from_str(&ct).unwrap());
                    }
                    Ok(res)
                }
                "/url" => Ok(CanonicalResponse::text(StatusCode::OK, request.url.to_string())),
                "/upload" => Ok(CanonicalResponse::json(StatusCode::OK, &json!({ "bytes": body.len() }))),
                "/upload-fail" => Err(AppError::new("could not store upload")),
                "/forbidden" => Err(AppError::with_status(StatusCode::FORBIDDEN, "token=abc123 rejected")),
                "/boom" => Err(AppError::new("password=hunter2 db exploded")),
                "/panic" => panic!("secret=xyz handler blew up"),
                "/pastes" => create_paste(&env.db, &body).await,
                path if path.starts_with("/dav") => {
                    if request.method.as_str() == "MKCOL" {
                        Ok(CanonicalResponse::new(StatusCode::CREATED))
                    } else {
                        Ok(CanonicalResponse::new(StatusCode::MULTI_STATUS)
                            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"))
                            .with_body("<d:multistatus xmlns:d=\"DAV:\"/>"))
                    }
                }
                _ => Ok(CanonicalResponse::new(StatusCode::NOT_FOUND)),
            }
        })
    }
}

/// Insert `{slug, content}` plus an audit row in one batch, then count.
async fn create_paste(db: &Database, body: &[u8]) -> Result<CanonicalResponse, AppError> {
    let paste: serde_json::Value = serde_json::from_slice(body)?;
    let slug = paste["slug"].as_str().unwrap_or_default().to_string();
    let content = paste["content"].as_str().unwrap_or_default().to_string();

    let insert = db
        .prepare("INSERT INTO pastes (slug, content) VALUES (?1, ?2)")
        .bind([slug.clone(), content]);
    let audit = db.prepare("INSERT INTO audit (slug) VALUES (?1)").bind([slug]);
    db.batch([BatchItem::from(insert), BatchItem::from(audit)]).await?;

    let count = db.prepare("SELECT COUNT(*) AS n FROM pastes").first_value("n").await?;
    Ok(CanonicalResponse::json(StatusCode::CREATED, &json!({ "count": count })))
}

/// A running bridge bound to an ephemeral port.
#[allow(dead_code)]
pub struct TestBridge {
    pub addr: SocketAddr,
    pub app: Arc<Recorder>,
    pub db: Database,
    pub spool_dir: PathBuf,
    pub config: BridgeConfig,
    shutdown: Shutdown,
    _dir: TempDir,
}

#[allow(dead_code)]
impl TestBridge {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn spool_entries(&self) -> usize {
        std::fs::read_dir(&self.spool_dir).map(|d| d.count()).unwrap_or(0)
    }

    /// Wait until the spool directory is empty, giving the server a moment
    /// to drop the response body after the client finished reading.
    pub async fn wait_for_empty_spool(&self) -> bool {
        for _ in 0..100 {
            if self.spool_entries() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for TestBridge {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Boot a bridge with defaults suitable for tests, after `configure`.
pub async fn start_bridge<F>(configure: F) -> TestBridge
where
    F: FnOnce(&mut BridgeConfig, &std::path::Path),
{
    let dir = tempfile::tempdir().unwrap();
    let mut config = BridgeConfig::default();
    config.storage.data_dir = dir.path().join("data");
    config.storage.temp_dir = Some(dir.path().join("spool"));
    config.supervisor.enabled = false;
    configure(&mut config, dir.path());

    let app = Arc::new(Recorder::default());
    let boot = lifecycle::build(&config, app.clone()).unwrap();
    let db = boot.db.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    tokio::spawn(boot.server.run(listener, shutdown.clone()));

    TestBridge {
        addr,
        app,
        db,
        spool_dir: config.storage.spool_dir(),
        config,
        shutdown,
        _dir: dir,
    }
}

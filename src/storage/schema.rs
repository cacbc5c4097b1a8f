//! Schema initialization, performed lazily and exactly once per process.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::storage::database::Database;
use crate::storage::error::{StorageError, StorageResult};

/// Creates or upgrades the schema the application expects.
///
/// Implementations must be idempotent (`CREATE TABLE IF NOT EXISTS` and
/// friends): a failed attempt is retried on a later request.
pub trait SchemaInitializer: Send + Sync {
    fn initialize<'a>(&'a self, db: &'a Database) -> BoxFuture<'a, StorageResult<()>>;
}

/// Does nothing. Used when the application manages its own schema.
#[derive(Debug, Default)]
pub struct NoSchema;

impl SchemaInitializer for NoSchema {
    fn initialize<'a>(&'a self, _db: &'a Database) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Applies a SQL script, either inline or read from disk on each attempt.
#[derive(Debug, Clone)]
pub enum SqlScriptSchema {
    Inline(String),
    File(PathBuf),
}

impl SchemaInitializer for SqlScriptSchema {
    fn initialize<'a>(&'a self, db: &'a Database) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let script = match self {
                SqlScriptSchema::Inline(sql) => sql.clone(),
                SqlScriptSchema::File(path) => tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| StorageError::Schema(format!("{}: {}", path.display(), e)))?,
            };
            db.exec(script).await?;
            Ok(())
        })
    }
}

/// Once-only initialization guard shared by all request tasks.
///
/// Concurrent first requests wait on the same attempt; a failed attempt
/// leaves the guard unset so the next request tries again.
#[derive(Clone)]
pub struct LazySchema {
    db: Database,
    initializer: Arc<dyn SchemaInitializer>,
    done: Arc<OnceCell<()>>,
}

impl LazySchema {
    pub fn new(db: Database, initializer: Arc<dyn SchemaInitializer>) -> Self {
        Self {
            db,
            initializer,
            done: Arc::new(OnceCell::new()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.done.initialized()
    }

    /// Run the initializer unless a previous call already succeeded.
    pub async fn ensure(&self) -> StorageResult<()> {
        self.done
            .get_or_try_init(|| async {
                tracing::info!("Initializing database schema");
                self.initializer.initialize(&self.db).await
            })
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SCHEMA: &str = "
        CREATE TABLE IF NOT EXISTS pastes (slug TEXT PRIMARY KEY, content TEXT);
        CREATE INDEX IF NOT EXISTS idx_pastes_content ON pastes(content);
    ";

    struct Counting {
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl SchemaInitializer for Counting {
        fn initialize<'a>(&'a self, db: &'a Database) -> BoxFuture<'a, StorageResult<()>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_first && n == 0 {
                    return Err(StorageError::Schema("disk not ready".into()));
                }
                db.exec(SCHEMA).await.map(|_| ())
            })
        }
    }

    async fn schema_dump(db: &Database) -> Vec<String> {
        db.prepare("SELECT sql FROM sqlite_master ORDER BY name")
            .all()
            .await
            .unwrap()
            .results
            .into_iter()
            .map(|row| row["sql"].to_string())
            .collect()
    }

    #[tokio::test]
    async fn concurrent_first_requests_initialize_once() {
        let db = Database::open_in_memory().unwrap();
        let init = Arc::new(Counting { calls: AtomicUsize::new(0), fail_first: false });
        let lazy = LazySchema::new(db.clone(), init.clone());

        let (a, b) = tokio::join!(lazy.ensure(), lazy.ensure());
        a.unwrap();
        b.unwrap();

        assert_eq!(init.calls.load(Ordering::SeqCst), 1);
        assert!(lazy.is_initialized());
    }

    #[tokio::test]
    async fn failed_initialization_is_retried() {
        let db = Database::open_in_memory().unwrap();
        let init = Arc::new(Counting { calls: AtomicUsize::new(0), fail_first: true });
        let lazy = LazySchema::new(db, init.clone());

        assert!(lazy.ensure().await.is_err());
        assert!(!lazy.is_initialized());
        lazy.ensure().await.unwrap();
        assert_eq!(init.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn script_is_idempotent() {
        let once = Database::open_in_memory().unwrap();
        let twice = Database::open_in_memory().unwrap();
        let schema = SqlScriptSchema::Inline(SCHEMA.to_string());

        schema.initialize(&once).await.unwrap();
        let (a, b) = tokio::join!(schema.initialize(&twice), schema.initialize(&twice));
        a.unwrap();
        b.unwrap();

        assert_eq!(schema_dump(&once).await, schema_dump(&twice).await);
    }
}

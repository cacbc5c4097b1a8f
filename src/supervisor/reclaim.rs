//! Advisory memory reclamation.

use futures_util::future::BoxFuture;

use crate::storage::{Database, StorageResult};

/// Something that can hand memory back on request.
pub trait Reclaimer: Send + Sync {
    fn name(&self) -> &'static str;
    fn reclaim(&self) -> BoxFuture<'_, StorageResult<()>>;
}

/// Asks SQLite to release page cache and lookaside memory it can spare.
#[derive(Debug, Clone)]
pub struct SqliteReclaimer {
    db: Database,
}

impl SqliteReclaimer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl Reclaimer for SqliteReclaimer {
    fn name(&self) -> &'static str {
        "sqlite-shrink-memory"
    }

    fn reclaim(&self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            self.db.exec("PRAGMA shrink_memory").await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shrink_memory_succeeds() {
        let db = Database::open_in_memory().unwrap();
        db.exec("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('x');").await.unwrap();
        SqliteReclaimer::new(db.clone()).reclaim().await.unwrap();

        let n = db.prepare("SELECT COUNT(*) AS n FROM t").first_value("n").await.unwrap();
        assert_eq!(n, Some(serde_json::json!(1)));
    }
}

//! Connection handle and the `prepare` / `batch` / `exec` surface.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rusqlite::{params_from_iter, Connection, OpenFlags};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::statement::{BatchItem, Statement};
use crate::storage::value::{value_ref_to_json, ExecResult, QueryMeta, QueryResult, Row, SqlValue};

/// Shared handle to the single embedded database connection.
///
/// Cloning is cheap; all clones talk to the same connection. Every call runs
/// on the blocking pool so request tasks never stall the reactor.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StorageError::Open(format!("{}: {}", path.display(), e)))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Open(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| StorageError::Open(format!("enable foreign keys: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a statement for `sql` with no bound parameters.
    pub fn prepare(&self, sql: impl Into<String>) -> Statement {
        Statement::new(self.clone(), sql.into())
    }

    /// Execute `items` as one all-or-nothing transaction.
    ///
    /// Results are returned in input order. On failure every earlier
    /// statement is rolled back and the failing statement's error is returned.
    pub async fn batch<I, T>(&self, items: I) -> StorageResult<Vec<QueryResult>>
    where
        I: IntoIterator<Item = T>,
        T: Into<BatchItem>,
    {
        let items: Vec<BatchItem> = items.into_iter().map(Into::into).collect();
        self.with_conn(move |conn| run_batch(conn, &items)).await
    }

    /// Run an arbitrary (possibly multi-statement) script outside any
    /// transaction wrapper.
    pub async fn exec(&self, sql: impl Into<String>) -> StorageResult<ExecResult> {
        let sql = sql.into();
        self.with_conn(move |conn| {
            let started = Instant::now();
            if let Err(e) = conn.execute_batch(&sql) {
                tracing::error!(sql = %sql, error = %e, "exec failed");
                return Err(e.into());
            }
            Ok(ExecResult {
                duration_ms: elapsed_ms(started),
            })
        })
        .await
    }

    /// Run a closure against the connection on the blocking pool.
    pub(crate) async fn with_conn<F, R>(&self, f: F) -> StorageResult<R>
    where
        F: FnOnce(&mut Connection) -> StorageResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StorageError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Worker(e.to_string()))?
    }
}

/// Execute one statement and collect its rows (if any).
pub(crate) fn execute_one(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
) -> rusqlite::Result<QueryResult> {
    let started = Instant::now();
    let mut stmt = conn.prepare(sql)?;
    let mut results: Vec<Row> = Vec::new();
    let mut changes = 0u64;

    if stmt.column_count() > 0 {
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, name) in names.iter().enumerate() {
                record.insert(name.clone(), value_ref_to_json(row.get_ref(idx)?));
            }
            results.push(record);
        }
        drop(rows);
        // `INSERT .. RETURNING` and friends write while yielding rows.
        if !stmt.readonly() {
            changes = conn.changes() as u64;
        }
    } else {
        changes = stmt.execute(params_from_iter(params.iter()))? as u64;
    }

    let rows_read = results.len() as u64;
    Ok(QueryResult {
        results,
        success: true,
        meta: QueryMeta {
            changes,
            last_row_id: conn.last_insert_rowid(),
            duration_ms: elapsed_ms(started),
            rows_read,
        },
    })
}

fn run_batch(conn: &mut Connection, items: &[BatchItem]) -> StorageResult<Vec<QueryResult>> {
    let tx = conn.transaction()?;
    let mut out = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let (sql, params) = item.parts();
        match execute_one(&tx, sql, params) {
            Ok(result) => out.push(result),
            Err(source) => {
                tracing::error!(
                    index,
                    sql = %sql,
                    params = ?params,
                    error = %source,
                    "Batch statement failed, rolling back"
                );
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(error = %rollback_err, "Batch rollback failed");
                }
                return Err(StorageError::Batch { index, source });
            }
        }
    }

    tx.commit()?;
    Ok(out)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::statement::BatchItem;

    async fn db_with_items() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.exec(
            "CREATE TABLE IF NOT EXISTS items (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS tags (item_id INTEGER NOT NULL REFERENCES items(id), tag TEXT);",
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn exec_runs_whole_script() {
        let db = Database::open_in_memory().unwrap();
        db.exec("CREATE TABLE a (x INTEGER); INSERT INTO a VALUES (1); INSERT INTO a VALUES (2);")
            .await
            .unwrap();
        let rows = db.prepare("SELECT x FROM a").all().await.unwrap();
        assert_eq!(rows.results.len(), 2);
    }

    #[tokio::test]
    async fn batch_commits_in_order() {
        let db = db_with_items().await;
        let results = db
            .batch(vec![
                BatchItem::bound("INSERT INTO items (id, name) VALUES (?, ?)", vec![1.into(), "a".into()]),
                BatchItem::from("INSERT INTO items (id, name) VALUES (2, 'b')"),
                BatchItem::bound("SELECT name FROM items ORDER BY id", Vec::new()),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].meta.changes, 1);
        assert_eq!(results[1].meta.last_row_id, 2);
        assert_eq!(results[2].results.len(), 2);
        assert_eq!(results[2].results[1]["name"], "b");
    }

    #[tokio::test]
    async fn returning_insert_reports_changes() {
        let db = db_with_items().await;
        let inserted = db
            .prepare("INSERT INTO items (name) VALUES (?1) RETURNING id")
            .bind(["paste"])
            .all()
            .await
            .unwrap();
        assert_eq!(inserted.meta.changes, 1);
        assert_eq!(inserted.results[0]["id"], 1);

        let read = db.prepare("SELECT id FROM items").all().await.unwrap();
        assert_eq!(read.meta.changes, 0);
    }

    #[tokio::test]
    async fn failed_batch_rolls_back_earlier_statements() {
        let db = db_with_items().await;
        let err = db
            .batch(vec![
                BatchItem::bound("INSERT INTO items (id, name) VALUES (?, 'x')", vec![1.into()]),
                BatchItem::bound("INSERT INTO nonexistent_table (id) VALUES (1)", Vec::new()),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Batch { index: 1, .. }));

        let rows = db.prepare("SELECT * FROM items").all().await.unwrap();
        assert!(rows.results.is_empty());
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = db_with_items().await;
        let err = db
            .prepare("INSERT INTO tags (item_id, tag) VALUES (?, ?)")
            .bind([SqlValue::from(42), "orphan".into()])
            .run()
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn constraint_failure_inside_batch_leaves_no_rows() {
        let db = db_with_items().await;
        let res = db
            .batch(vec![
                BatchItem::bound("INSERT INTO items (id, name) VALUES (5, 'ok')", Vec::new()),
                BatchItem::bound("INSERT INTO tags (item_id, tag) VALUES (99, 'bad')", Vec::new()),
            ])
            .await;
        assert!(res.is_err());

        let count = db
            .prepare("SELECT COUNT(*) AS n FROM items")
            .first_value("n")
            .await
            .unwrap();
        assert_eq!(count, Some(serde_json::json!(0)));
    }
}

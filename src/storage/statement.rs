//! Prepared statements and batch entries.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::storage::database::{execute_one, Database};
use crate::storage::error::StorageResult;
use crate::storage::value::{QueryResult, Row, SqlValue};

/// A statement bound to the owning connection.
///
/// Statements are values: `bind` returns a new statement carrying the given
/// parameters and leaves `self` untouched, so one prepared statement can be
/// reused with different parameters.
#[derive(Debug, Clone)]
pub struct Statement {
    db: Database,
    sql: Arc<str>,
    params: Vec<SqlValue>,
}

impl Statement {
    pub(crate) fn new(db: Database, sql: String) -> Self {
        Self {
            db,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Replace the positional parameters.
    pub fn bind<I, V>(&self, params: I) -> Statement
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Statement {
            db: self.db.clone(),
            sql: Arc::clone(&self.sql),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Execute for side effect.
    pub async fn run(&self) -> StorageResult<QueryResult> {
        let mut result = self.execute().await?;
        result.results.clear();
        Ok(result)
    }

    /// Execute and return every row.
    pub async fn all(&self) -> StorageResult<QueryResult> {
        self.execute().await
    }

    /// Execute and return the first row, if any.
    pub async fn first(&self) -> StorageResult<Option<Row>> {
        let result = self.execute().await?;
        Ok(result.results.into_iter().next())
    }

    /// Execute and return one column of the first row.
    pub async fn first_value(&self, column: &str) -> StorageResult<Option<Value>> {
        Ok(self.first().await?.and_then(|mut row| row.remove(column)))
    }

    async fn execute(&self) -> StorageResult<QueryResult> {
        let sql = Arc::clone(&self.sql);
        let params = self.params.clone();
        self.db
            .with_conn(move |conn| {
                execute_one(conn, &sql, &params).map_err(|e| {
                    tracing::error!(sql = %sql, params = ?params, error = %e, "Statement failed");
                    e.into()
                })
            })
            .await
    }
}

/// One entry of a batch.
///
/// Deserializes from either a bare SQL string or `{ "sql": .., "params": [..] }`
/// with `params` optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Sql(String),
    Bound {
        sql: String,
        #[serde(default)]
        params: Vec<SqlValue>,
    },
}

impl BatchItem {
    pub fn bound(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        BatchItem::Bound {
            sql: sql.into(),
            params,
        }
    }

    pub(crate) fn parts(&self) -> (&str, &[SqlValue]) {
        match self {
            BatchItem::Sql(sql) => (sql.as_str(), &[]),
            BatchItem::Bound { sql, params } => (sql.as_str(), params.as_slice()),
        }
    }
}

impl From<&str> for BatchItem {
    fn from(sql: &str) -> Self {
        BatchItem::Sql(sql.to_string())
    }
}

impl From<String> for BatchItem {
    fn from(sql: String) -> Self {
        BatchItem::Sql(sql)
    }
}

impl From<Statement> for BatchItem {
    fn from(stmt: Statement) -> Self {
        BatchItem::Bound {
            sql: stmt.sql.to_string(),
            params: stmt.params,
        }
    }
}

impl From<&Statement> for BatchItem {
    fn from(stmt: &Statement) -> Self {
        stmt.clone().into()
    }
}

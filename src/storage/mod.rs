//! Persistence adapter over the embedded SQL engine.
//!
//! # Data Flow
//! ```text
//! application storage code
//!     → Database::prepare(sql) → Statement
//!         → bind(params) → run / all / first        (autocommit)
//!     → Database::batch([..])                        (single transaction)
//!     → Database::exec(script)                       (multi-statement, no wrapper)
//!     → blocking pool → rusqlite::Connection (one per process)
//! ```
//!
//! # Design Decisions
//! - Foreign keys are enabled when the connection is opened
//! - `batch` is the only place offering transactional isolation
//! - Errors are logged here with full SQL and parameters, then returned
//! - Schema setup is external (`SchemaInitializer`) and guarded by `LazySchema`

pub mod database;
pub mod error;
pub mod schema;
pub mod statement;
pub mod value;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use schema::{LazySchema, NoSchema, SchemaInitializer, SqlScriptSchema};
pub use statement::{BatchItem, Statement};
pub use value::{ExecResult, QueryMeta, QueryResult, Row, SqlValue};

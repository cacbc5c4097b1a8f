//! Parameter and result value types.
//!
//! Parameters are positional and loosely typed, the same shape a managed
//! database client accepts from application code. Rows come back as JSON
//! objects keyed by column name so business logic can consume them directly.

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

/// A single positional parameter.
///
/// Deserializes from any JSON value with the same coercions as
/// `From<serde_json::Value>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl<'de> Deserialize<'de> for SqlValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(SqlValue::from)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => ValueRef::Null,
            SqlValue::Integer(i) => ValueRef::Integer(*i),
            SqlValue::Real(f) => ValueRef::Real(*f),
            SqlValue::Text(s) => ValueRef::Text(s.as_bytes()),
            SqlValue::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl From<Value> for SqlValue {
    /// JSON values map the way a fetch-runtime client coerces them: booleans
    /// become 0/1, nested arrays and objects are stored as their JSON text.
    fn from(v: Value) -> Self {
        match v {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => b.into(),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

/// A result row keyed by column name, in column order.
pub type Row = Map<String, Value>;

/// Convert a borrowed engine value into JSON.
///
/// Blobs become arrays of byte values.
pub(crate) fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

/// Execution metadata returned alongside every statement result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryMeta {
    /// Rows modified by the statement (0 for reads).
    pub changes: u64,
    /// Rowid of the most recent successful insert on the connection.
    pub last_row_id: i64,
    /// Wall-clock time spent in the engine.
    pub duration_ms: f64,
    /// Rows returned to the caller.
    pub rows_read: u64,
}

/// Outcome of `run`, `all` or a single batch entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub results: Vec<Row>,
    pub success: bool,
    pub meta: QueryMeta,
}

/// Outcome of `exec`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecResult {
    pub duration_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_coerce() {
        assert_eq!(SqlValue::from(json!(true)), SqlValue::Integer(1));
        assert_eq!(SqlValue::from(json!(7)), SqlValue::Integer(7));
        assert_eq!(SqlValue::from(json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(SqlValue::from(json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from(json!({"a": 1})), SqlValue::Text("{\"a\":1}".into()));
    }

    #[test]
    fn params_deserialize_like_json_coercion() {
        let params: Vec<SqlValue> =
            serde_json::from_str(r#"[true, false, 42, 2.5, "x", null, {"k": [1]}]"#).unwrap();
        assert_eq!(
            params,
            vec![
                SqlValue::Integer(1),
                SqlValue::Integer(0),
                SqlValue::Integer(42),
                SqlValue::Real(2.5),
                SqlValue::Text("x".into()),
                SqlValue::Null,
                SqlValue::Text("{\"k\":[1]}".into()),
            ]
        );
    }

    #[test]
    fn optional_maps_to_null() {
        let none: Option<i64> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }

    #[test]
    fn blob_renders_as_byte_array() {
        assert_eq!(value_ref_to_json(ValueRef::Blob(&[1, 2])), json!([1, 2]));
    }
}

// Database Interface - thin handle over the relational store
// The framework only ever talks to the store through this trait: parameterised
// statements in, plain field mappings out.

use crate::error::AppResult;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// A row as returned by the store: column name to plain JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Shared database handle passed to every query and action.
pub type Database = Arc<dyn DatabaseInterface>;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Blob(Vec<u8>),
}

impl SqlParam {
    /// Best-effort conversion for values without a column type hint.
    /// Arrays and objects are stored as JSON text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Integer(i),
                None => SqlParam::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlParam::Text(s.clone()),
            other => SqlParam::Text(other.to_string()),
        }
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Integer(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Real(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Boolean(v)
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlParam {
    fn from(v: Vec<u8>) -> Self {
        SqlParam::Blob(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlParam::Null, Into::into)
    }
}

/// Hashable identity of a row, used to group related rows by owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    Integer(i64),
    Text(String),
}

impl RowKey {
    /// Integral numbers and strings are keys; anything else is not.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RowKey::Integer),
            Value::String(s) => Some(RowKey::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RowKey::Integer(i) => Value::from(*i),
            RowKey::Text(s) => Value::String(s.clone()),
        }
    }

    pub fn to_param(&self) -> SqlParam {
        match self {
            RowKey::Integer(i) => SqlParam::Integer(*i),
            RowKey::Text(s) => SqlParam::Text(s.clone()),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Integer(i) => write!(f, "{}", i),
            RowKey::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RowKey {
    fn from(v: i64) -> Self {
        RowKey::Integer(v)
    }
}

impl From<&str> for RowKey {
    fn from(v: &str) -> Self {
        RowKey::Text(v.to_string())
    }
}

impl From<String> for RowKey {
    fn from(v: String) -> Self {
        RowKey::Text(v)
    }
}

/// SQL text plus its bound parameters. The label names the statement's
/// purpose for logging and per-label execution counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub label: &'static str,
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(label: &'static str, sql: impl Into<String>) -> Self {
        Self {
            label,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<SqlParam>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn bind_all(mut self, params: impl IntoIterator<Item = SqlParam>) -> Self {
        self.params.extend(params);
        self
    }
}

/// Database interface trait for entity operations
#[async_trait]
pub trait DatabaseInterface: Send + Sync {
    /// Run a statement and return every produced row.
    async fn fetch_all(&self, statement: Statement) -> AppResult<Vec<Row>>;

    /// Run a statement and return its first row, if any.
    async fn fetch_optional(&self, statement: Statement) -> AppResult<Option<Row>> {
        Ok(self.fetch_all(statement).await?.into_iter().next())
    }

    /// Run a statement for its effect; returns the number of affected rows.
    async fn execute(&self, statement: Statement) -> AppResult<u64>;

    /// Open a transaction. Opening one on a transaction handle nests it.
    async fn begin_transaction(&self) -> AppResult<Arc<dyn DatabaseTransaction>>;
}

/// A transaction handle. It is a full `DatabaseInterface` so raw query and
/// action implementations run against it unchanged.
#[async_trait]
pub trait DatabaseTransaction: DatabaseInterface {
    async fn commit(&self) -> AppResult<()>;
    async fn rollback(&self) -> AppResult<()>;

    /// View this transaction as a plain database handle.
    fn into_database(self: Arc<Self>) -> Database;
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
pub async fn with_transaction<T, F, Fut>(db: &Database, f: F) -> AppResult<T>
where
    F: FnOnce(Database) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let tx = db.begin_transaction().await?;
    match f(Arc::clone(&tx).into_database()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback after '{}' failed: {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_from_value() {
        assert_eq!(SqlParam::from_value(&Value::Null), SqlParam::Null);
        assert_eq!(SqlParam::from_value(&Value::from(7)), SqlParam::Integer(7));
        assert_eq!(SqlParam::from_value(&Value::from(1.5)), SqlParam::Real(1.5));
        assert_eq!(SqlParam::from_value(&Value::from(true)), SqlParam::Boolean(true));
        assert_eq!(
            SqlParam::from_value(&serde_json::json!(["a"])),
            SqlParam::Text("[\"a\"]".to_string())
        );
    }

    #[test]
    fn test_row_key_from_value() {
        assert_eq!(RowKey::from_value(&Value::from(3)), Some(RowKey::Integer(3)));
        assert_eq!(
            RowKey::from_value(&Value::from("x")),
            Some(RowKey::Text("x".to_string()))
        );
        assert_eq!(RowKey::from_value(&Value::Null), None);
        assert_eq!(RowKey::from_value(&Value::from(1.5)), None);
    }

    #[test]
    fn test_statement_builder() {
        let statement = Statement::new("select_by_id", "SELECT * FROM t WHERE id = ?")
            .bind("abc")
            .bind(None::<i64>);
        assert_eq!(statement.params, vec![SqlParam::Text("abc".into()), SqlParam::Null]);
    }
}

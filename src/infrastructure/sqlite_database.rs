use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row as _, Transaction, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    Database, DatabaseInterface, DatabaseTransaction, Row, SqlParam, Statement,
};

/// SQLite implementation of the database interface
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| {
                AppError::ConfigurationError(format!("Invalid database URL {}: {}", config.url, e))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let mut pool_options =
            SqlitePoolOptions::new().max_connections(config.effective_max_connections());
        if config.is_in_memory() {
            // Closing the only connection would drop the whole database.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to connect to {}: {}", config.url, e))
        })?;

        debug!("Connected to {}", config.url);
        Ok(Self { pool })
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect(&DatabaseConfig::in_memory()).await
    }

    pub fn into_database(self) -> Database {
        Arc::new(self)
    }

    /// Health check to verify database connectivity
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseInterface for SqliteDatabase {
    async fn fetch_all(&self, statement: Statement) -> AppResult<Vec<Row>> {
        debug!(label = statement.label, sql = %statement.sql, "fetch");
        let rows = bind_statement(&statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error(statement.label, e))?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, statement: Statement) -> AppResult<u64> {
        debug!(label = statement.label, sql = %statement.sql, "execute");
        let result = bind_statement(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(statement.label, e))?;
        Ok(result.rows_affected())
    }

    async fn begin_transaction(&self) -> AppResult<Arc<dyn DatabaseTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;
        Ok(Arc::new(SqliteTransaction {
            inner: Arc::new(Mutex::new(Some(tx))),
            savepoint: None,
            depth: Arc::new(AtomicU32::new(0)),
        }))
    }
}

/// Transaction handle. Nested transactions share the outer connection and
/// map onto SAVEPOINTs.
pub struct SqliteTransaction {
    inner: Arc<Mutex<Option<Transaction<'static, Sqlite>>>>,
    savepoint: Option<String>,
    depth: Arc<AtomicU32>,
}

impl SqliteTransaction {
    async fn run_control(&self, sql: String) -> AppResult<()> {
        self.execute(Statement::new("transaction_control", sql))
            .await
            .map(|_| ())
    }

    async fn finish(&self, commit: bool) -> AppResult<()> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(|| AppError::Internal("Transaction already finished".to_string()))?;
        if commit {
            tx.commit()
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to commit transaction: {}", e)))
        } else {
            tx.rollback().await.map_err(|e| {
                AppError::DatabaseError(format!("Failed to rollback transaction: {}", e))
            })
        }
    }
}

#[async_trait]
impl DatabaseInterface for SqliteTransaction {
    async fn fetch_all(&self, statement: Statement) -> AppResult<Vec<Row>> {
        debug!(label = statement.label, sql = %statement.sql, "fetch in transaction");
        let mut guard = self.inner.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::Internal("Transaction already finished".to_string()))?;
        let rows = bind_statement(&statement)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| store_error(statement.label, e))?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, statement: Statement) -> AppResult<u64> {
        debug!(label = statement.label, sql = %statement.sql, "execute in transaction");
        let mut guard = self.inner.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::Internal("Transaction already finished".to_string()))?;
        let result = bind_statement(&statement)
            .execute(&mut **tx)
            .await
            .map_err(|e| store_error(statement.label, e))?;
        Ok(result.rows_affected())
    }

    async fn begin_transaction(&self) -> AppResult<Arc<dyn DatabaseTransaction>> {
        let level = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("ent_savepoint_{}", level);
        self.run_control(format!("SAVEPOINT {}", name)).await?;
        Ok(Arc::new(SqliteTransaction {
            inner: Arc::clone(&self.inner),
            savepoint: Some(name),
            depth: Arc::clone(&self.depth),
        }))
    }
}

#[async_trait]
impl DatabaseTransaction for SqliteTransaction {
    async fn commit(&self) -> AppResult<()> {
        match &self.savepoint {
            Some(name) => self.run_control(format!("RELEASE SAVEPOINT {}", name)).await,
            None => self.finish(true).await,
        }
    }

    async fn rollback(&self) -> AppResult<()> {
        match &self.savepoint {
            Some(name) => {
                self.run_control(format!("ROLLBACK TO SAVEPOINT {}", name))
                    .await?;
                self.run_control(format!("RELEASE SAVEPOINT {}", name)).await
            }
            None => self.finish(false).await,
        }
    }

    fn into_database(self: Arc<Self>) -> Database {
        self
    }
}

fn bind_statement(statement: &Statement) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
    let mut query = sqlx::query(&statement.sql);
    for param in &statement.params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Integer(v) => query.bind(*v),
            SqlParam::Real(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Boolean(v) => query.bind(*v),
            SqlParam::Blob(v) => query.bind(v.as_slice()),
        };
    }
    query
}

/// Convert a SQLite row into a plain field mapping using each value's
/// storage class. Blobs are surfaced as base64 text.
fn decode_row(row: &SqliteRow) -> AppResult<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let decode_err = |e: sqlx::Error| {
            AppError::DatabaseError(format!("Failed to decode column {}: {}", column.name(), e))
        };
        let raw = row.try_get_raw(index).map_err(decode_err)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage_class = raw.type_info().name().to_ascii_uppercase();
            match storage_class.as_str() {
                "INTEGER" | "BOOLEAN" => {
                    Value::from(row.try_get_unchecked::<i64, _>(index).map_err(decode_err)?)
                }
                "REAL" | "NUMERIC" => {
                    let v = row.try_get_unchecked::<f64, _>(index).map_err(decode_err)?;
                    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
                }
                "BLOB" => {
                    let bytes = row
                        .try_get_unchecked::<Vec<u8>, _>(index)
                        .map_err(decode_err)?;
                    Value::String(STANDARD.encode(bytes))
                }
                _ => Value::String(
                    row.try_get_unchecked::<String, _>(index)
                        .map_err(decode_err)?,
                ),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// Map a driver error, keeping uniqueness violations distinguishable.
pub(crate) fn store_error(label: &str, err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::UniqueViolation(format!("{}: {}", label, db_err));
        }
    }
    AppError::DatabaseError(format!("Statement '{}' failed: {}", label, err))
}

// Database Decorators - pluggable instrumentation around any database handle
// Counts executions per statement label and traces each call with its timing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::infrastructure::database::{
    Database, DatabaseInterface, DatabaseTransaction, Row, Statement,
};

/// Per-label statement execution counters, shared between a handle and
/// every transaction opened from it.
#[derive(Debug, Default)]
pub struct StatementStats {
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl StatementStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, label: &'static str) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(label).or_insert(0) += 1;
        }
    }

    /// Number of statements executed with the given label.
    pub fn count(&self, label: &str) -> u64 {
        self.counts
            .lock()
            .map(|counts| counts.get(label).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total number of statements executed.
    pub fn total(&self) -> u64 {
        self.counts
            .lock()
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        if let Ok(mut counts) = self.counts.lock() {
            counts.clear();
        }
    }
}

/// Instrumentation decorator over a database handle.
pub struct InstrumentedDatabase {
    inner: Database,
    stats: Arc<StatementStats>,
}

impl InstrumentedDatabase {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            stats: Arc::new(StatementStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<StatementStats> {
        Arc::clone(&self.stats)
    }

    /// Wrap `inner` and hand back the shared handle plus its counters.
    pub fn wrap(inner: Database) -> (Database, Arc<StatementStats>) {
        let decorated = Self::new(inner);
        let stats = decorated.stats();
        (Arc::new(decorated), stats)
    }
}

async fn observe<T>(
    stats: &StatementStats,
    label: &'static str,
    operation: &'static str,
    run: impl std::future::Future<Output = AppResult<T>>,
) -> AppResult<T> {
    let start = Instant::now();
    stats.record(label);
    let result = run.await;
    match &result {
        Ok(_) => debug!(label, operation, elapsed_us = start.elapsed().as_micros() as u64, "statement"),
        Err(e) => warn!(label, operation, "statement failed: {}", e),
    }
    result
}

#[async_trait]
impl DatabaseInterface for InstrumentedDatabase {
    async fn fetch_all(&self, statement: Statement) -> AppResult<Vec<Row>> {
        let label = statement.label;
        observe(&self.stats, label, "fetch_all", self.inner.fetch_all(statement)).await
    }

    async fn fetch_optional(&self, statement: Statement) -> AppResult<Option<Row>> {
        let label = statement.label;
        observe(&self.stats, label, "fetch_optional", self.inner.fetch_optional(statement)).await
    }

    async fn execute(&self, statement: Statement) -> AppResult<u64> {
        let label = statement.label;
        observe(&self.stats, label, "execute", self.inner.execute(statement)).await
    }

    async fn begin_transaction(&self) -> AppResult<Arc<dyn DatabaseTransaction>> {
        let inner = self.inner.begin_transaction().await?;
        Ok(Arc::new(InstrumentedTransaction {
            inner,
            stats: Arc::clone(&self.stats),
        }))
    }
}

/// Transaction opened through an `InstrumentedDatabase`.
pub struct InstrumentedTransaction {
    inner: Arc<dyn DatabaseTransaction>,
    stats: Arc<StatementStats>,
}

#[async_trait]
impl DatabaseInterface for InstrumentedTransaction {
    async fn fetch_all(&self, statement: Statement) -> AppResult<Vec<Row>> {
        let label = statement.label;
        observe(&self.stats, label, "fetch_all", self.inner.fetch_all(statement)).await
    }

    async fn fetch_optional(&self, statement: Statement) -> AppResult<Option<Row>> {
        let label = statement.label;
        observe(&self.stats, label, "fetch_optional", self.inner.fetch_optional(statement)).await
    }

    async fn execute(&self, statement: Statement) -> AppResult<u64> {
        let label = statement.label;
        observe(&self.stats, label, "execute", self.inner.execute(statement)).await
    }

    async fn begin_transaction(&self) -> AppResult<Arc<dyn DatabaseTransaction>> {
        let inner = self.inner.begin_transaction().await?;
        Ok(Arc::new(InstrumentedTransaction {
            inner,
            stats: Arc::clone(&self.stats),
        }))
    }
}

#[async_trait]
impl DatabaseTransaction for InstrumentedTransaction {
    async fn commit(&self) -> AppResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> AppResult<()> {
        self.inner.rollback().await
    }

    fn into_database(self: Arc<Self>) -> Database {
        self
    }
}
